use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::RepoData;
use uuid::Uuid;

use crate::db::types::{
    Board, BoardStanding, Commit, Game, Language, LanguageBoard, LanguageStanding, Player,
    PlayerBoard, PlayerStanding, Project, User,
};

#[cfg(test)]
pub mod memory;

/// The transactional store the pipeline runs against.
///
/// Production is Postgres behind [`crate::db::DB`]; tests use
/// [`memory::MemStore`]. Read-side queries live here, mutations go through a
/// [`StoreTx`].
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: StoreTx;

    async fn begin(&self) -> anyhow::Result<Self::Tx>;

    async fn find_game(&self, game_id: Uuid) -> anyhow::Result<Option<Game>>;

    /// Strict resolution: a game whose `[start, end)` window contains `at`
    /// and which is marked active.
    async fn active_game(&self, at: DateTime<Utc>) -> anyhow::Result<Option<Game>>;

    /// The most recently ended game as of `at`, the display fallback when no
    /// game window is open.
    async fn latest_ended_game(&self, at: DateTime<Utc>) -> anyhow::Result<Option<Game>>;

    async fn player_leaderboard(
        &self,
        game_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<PlayerStanding>>;

    async fn project_leaderboard(
        &self,
        game_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<BoardStanding>>;

    async fn language_leaderboard(
        &self,
        game_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<LanguageStanding>>;
}

/// One unit of work. Everything done through a transaction either commits as
/// a whole or is rolled back on drop; `lock_*` reads take a row lock held for
/// the rest of the transaction.
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self) -> anyhow::Result<()>
    where
        Self: Sized;

    // Games
    async fn insert_game(&mut self, game: &Game) -> anyhow::Result<()>;
    async fn deactivate_games_except(&mut self, keep: Uuid) -> anyhow::Result<()>;
    async fn find_game_by_id(&mut self, game_id: Uuid) -> anyhow::Result<Option<Game>>;
    async fn find_active_game_at(&mut self, at: DateTime<Utc>) -> anyhow::Result<Option<Game>>;

    // Projects
    /// Single-statement insert-or-update keyed on `(service, repo_id)` when
    /// the provider supplies a stable id, else on `slug`.
    async fn upsert_project(&mut self, repo: &RepoData) -> anyhow::Result<Project>;
    async fn set_project_active(&mut self, project_id: Uuid, is_active: bool)
        -> anyhow::Result<()>;

    // Users and identifiers
    async fn insert_user(&mut self, user: &User) -> anyhow::Result<()>;
    async fn update_user_profile(
        &mut self,
        user_id: Uuid,
        name: &str,
        avatar_url: Option<&str>,
    ) -> anyhow::Result<()>;
    async fn set_user_active(&mut self, user_id: Uuid, is_active: bool) -> anyhow::Result<()>;
    async fn find_user_by_identifier(
        &mut self,
        identifier_type: &str,
        value: &str,
    ) -> anyhow::Result<Option<User>>;
    /// Insert-or-ignore on the globally unique `(type, value)` key. Ownership
    /// conflicts are checked by the caller before linking.
    async fn link_identifier(
        &mut self,
        user_id: Uuid,
        identifier_type: &str,
        value: &str,
    ) -> anyhow::Result<()>;

    // Commits
    /// Insert-or-ignore keyed on the globally unique commit hash. Returns
    /// false when the hash was already present (duplicate delivery).
    async fn insert_commit(&mut self, commit: &Commit) -> anyhow::Result<bool>;
    async fn set_commit_game(&mut self, commit_id: Uuid, game_id: Uuid) -> anyhow::Result<()>;
    /// Guarded re-attribution: only flips `user_id` while it is still null,
    /// so a repeated or racing claim affects zero rows.
    async fn attribute_commit(&mut self, commit_id: Uuid, user_id: Uuid) -> anyhow::Result<bool>;
    async fn find_orphan_commits_by_emails(
        &mut self,
        emails: &[String],
    ) -> anyhow::Result<Vec<Commit>>;
    /// Orphan commits whose author email now matches a registered email
    /// identifier, paired with the owning user.
    async fn find_claimable_orphans(&mut self) -> anyhow::Result<Vec<(Commit, Uuid)>>;
    async fn count_user_commits_in_game(
        &mut self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<i64>;

    // Aggregates
    async fn lock_board(
        &mut self,
        game_id: Uuid,
        project_id: Uuid,
    ) -> anyhow::Result<Option<Board>>;
    async fn insert_board(&mut self, board: &Board) -> anyhow::Result<()>;
    async fn update_board(&mut self, board: &Board) -> anyhow::Result<()>;

    async fn get_or_create_language(&mut self, name: &str) -> anyhow::Result<Language>;
    async fn lock_language_board(
        &mut self,
        game_id: Uuid,
        language_id: Uuid,
    ) -> anyhow::Result<Option<LanguageBoard>>;
    async fn insert_language_board(&mut self, board: &LanguageBoard) -> anyhow::Result<()>;
    async fn update_language_board(&mut self, board: &LanguageBoard) -> anyhow::Result<()>;

    async fn lock_player(&mut self, game_id: Uuid, user_id: Uuid)
        -> anyhow::Result<Option<Player>>;
    async fn lock_player_by_id(&mut self, player_id: Uuid) -> anyhow::Result<Option<Player>>;
    async fn insert_player(&mut self, player: &Player) -> anyhow::Result<()>;
    async fn update_player(&mut self, player: &Player) -> anyhow::Result<()>;

    async fn find_player_board(
        &mut self,
        player_id: Uuid,
        board_id: Uuid,
    ) -> anyhow::Result<Option<PlayerBoard>>;
    async fn insert_player_board(&mut self, player_board: &PlayerBoard) -> anyhow::Result<()>;
    async fn update_player_board(&mut self, player_board: &PlayerBoard) -> anyhow::Result<()>;
}
