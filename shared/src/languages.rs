/// Maps a file path to a language name by extension.
///
/// Paths with no extension or an unrecognized one detect nothing; such files
/// never reach a language aggregate.
pub fn detect_language(path: &str) -> Option<&'static str> {
    let file_name = path.rsplit('/').next()?;
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        // dotfiles like `.gitignore` carry no extension
        return None;
    }

    let language = match extension.to_ascii_lowercase().as_str() {
        "asm" | "s" => "Assembly",
        "c" | "h" => "C",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "C++",
        "cs" => "C#",
        "clj" | "cljs" => "Clojure",
        "coffee" => "CoffeeScript",
        "css" => "CSS",
        "d" => "D",
        "dart" => "Dart",
        "el" => "Emacs Lisp",
        "erl" | "hrl" => "Erlang",
        "ex" | "exs" => "Elixir",
        "fs" | "fsx" => "F#",
        "go" => "Go",
        "groovy" => "Groovy",
        "hs" | "lhs" => "Haskell",
        "html" | "htm" => "HTML",
        "java" => "Java",
        "js" | "mjs" => "JavaScript",
        "jl" => "Julia",
        "kt" | "kts" => "Kotlin",
        "lisp" | "lsp" => "Common Lisp",
        "lua" => "Lua",
        "m" => "Objective-C",
        "ml" | "mli" => "OCaml",
        "md" | "markdown" => "Markdown",
        "pl" | "pm" => "Perl",
        "php" => "PHP",
        "ps1" => "PowerShell",
        "py" | "pyw" => "Python",
        "r" => "R",
        "rb" | "rake" => "Ruby",
        "rs" => "Rust",
        "sass" | "scss" => "Sass",
        "scala" => "Scala",
        "scm" => "Scheme",
        "sh" | "bash" => "Shell",
        "sql" => "SQL",
        "swift" => "Swift",
        "tex" => "TeX",
        "ts" | "tsx" => "TypeScript",
        "vb" => "Visual Basic",
        "vim" => "Vim script",
        "xml" => "XML",
        "yml" | "yaml" => "YAML",
        _ => return None,
    };

    Some(language)
}
