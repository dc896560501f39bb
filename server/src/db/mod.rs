use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocket::{
    fairing::{self, AdHoc},
    Build, Rocket,
};
use rocket_db_pools::Database;
use shared::RepoData;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::store::{Store, StoreTx};

pub mod types;

use types::{
    Board, BoardStanding, Commit, Game, Language, LanguageBoard, LanguageStanding, Player,
    PlayerBoard, PlayerStanding, Project, User,
};

#[derive(Database, Clone, Debug)]
#[database("commit-games")]
pub struct DB(pub PgPool);

/// One Postgres transaction implementing the store seam. Dropping it without
/// `commit` rolls everything back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for DB {
    type Tx = PgTx;

    async fn begin(&self) -> anyhow::Result<PgTx> {
        Ok(PgTx {
            tx: self.0.begin().await?,
        })
    }

    async fn find_game(&self, game_id: Uuid) -> anyhow::Result<Option<Game>> {
        Ok(sqlx::query_as::<_, Game>("SELECT * FROM games WHERE id = $1")
            .bind(game_id)
            .fetch_optional(&self.0)
            .await?)
    }

    async fn active_game(&self, at: DateTime<Utc>) -> anyhow::Result<Option<Game>> {
        Ok(sqlx::query_as::<_, Game>(
            r#"
            SELECT * FROM games
            WHERE is_active AND start_at <= $1 AND end_at > $1
            ORDER BY end_at ASC
            LIMIT 1
            "#,
        )
        .bind(at)
        .fetch_optional(&self.0)
        .await?)
    }

    async fn latest_ended_game(&self, at: DateTime<Utc>) -> anyhow::Result<Option<Game>> {
        Ok(sqlx::query_as::<_, Game>(
            r#"
            SELECT * FROM games
            WHERE end_at <= $1
            ORDER BY end_at DESC
            LIMIT 1
            "#,
        )
        .bind(at)
        .fetch_optional(&self.0)
        .await?)
    }

    async fn player_leaderboard(
        &self,
        game_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<PlayerStanding>> {
        Ok(sqlx::query_as::<_, PlayerStanding>(
            r#"
            SELECT p.user_id, u.name, p.points, p.potential_points, p.verified_points,
                   p.commit_count, p.project_count
            FROM players p
            JOIN users u ON u.id = p.user_id
            WHERE p.game_id = $1 AND u.is_active
            ORDER BY p.verified_points DESC, p.potential_points DESC
            LIMIT $2
            "#,
        )
        .bind(game_id)
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }

    async fn project_leaderboard(
        &self,
        game_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<BoardStanding>> {
        Ok(sqlx::query_as::<_, BoardStanding>(
            r#"
            SELECT b.project_id, pr.name, pr.slug, b.points, b.potential_points,
                   b.verified_points, b.commit_count, b.contributor_count
            FROM boards b
            JOIN projects pr ON pr.id = b.project_id
            WHERE b.game_id = $1 AND pr.is_active
            ORDER BY b.verified_points DESC, b.potential_points DESC
            LIMIT $2
            "#,
        )
        .bind(game_id)
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }

    async fn language_leaderboard(
        &self,
        game_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<LanguageStanding>> {
        Ok(sqlx::query_as::<_, LanguageStanding>(
            r#"
            SELECT l.name, lb.points, lb.commit_count
            FROM language_boards lb
            JOIN languages l ON l.id = lb.language_id
            WHERE lb.game_id = $1
            ORDER BY lb.points DESC
            LIMIT $2
            "#,
        )
        .bind(game_id)
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self) -> anyhow::Result<()> {
        Ok(self.tx.commit().await?)
    }

    async fn insert_game(&mut self, game: &Game) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO games (id, start_at, end_at, commit_points, project_points, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(game.id)
        .bind(game.start_at)
        .bind(game.end_at)
        .bind(game.commit_points)
        .bind(game.project_points)
        .bind(game.is_active)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn deactivate_games_except(&mut self, keep: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE games SET is_active = FALSE WHERE id <> $1")
            .bind(keep)
            .execute(self.tx.as_mut())
            .await?;
        Ok(())
    }

    async fn find_game_by_id(&mut self, game_id: Uuid) -> anyhow::Result<Option<Game>> {
        Ok(sqlx::query_as::<_, Game>("SELECT * FROM games WHERE id = $1")
            .bind(game_id)
            .fetch_optional(self.tx.as_mut())
            .await?)
    }

    async fn find_active_game_at(&mut self, at: DateTime<Utc>) -> anyhow::Result<Option<Game>> {
        Ok(sqlx::query_as::<_, Game>(
            r#"
            SELECT * FROM games
            WHERE is_active AND start_at <= $1 AND end_at > $1
            ORDER BY end_at ASC
            LIMIT 1
            "#,
        )
        .bind(at)
        .fetch_optional(self.tx.as_mut())
        .await?)
    }

    async fn upsert_project(&mut self, repo: &RepoData) -> anyhow::Result<Project> {
        // A provider-side rename keeps the identity key and rewrites the
        // mutable fields in place; the insert and the update are one
        // statement, so there is no read-then-write window.
        let project = if repo.repo_id.is_some() {
            sqlx::query_as::<_, Project>(
                r#"
                INSERT INTO projects (id, service, url, name, slug, description, repo_id, owner, forks, watchers)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (service, repo_id) WHERE repo_id IS NOT NULL
                DO UPDATE SET url = EXCLUDED.url, name = EXCLUDED.name, slug = EXCLUDED.slug,
                              description = EXCLUDED.description, owner = EXCLUDED.owner,
                              forks = EXCLUDED.forks, watchers = EXCLUDED.watchers
                RETURNING *
                "#,
            )
        } else {
            sqlx::query_as::<_, Project>(
                r#"
                INSERT INTO projects (id, service, url, name, slug, description, repo_id, owner, forks, watchers)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (slug)
                DO UPDATE SET url = EXCLUDED.url, name = EXCLUDED.name,
                              description = EXCLUDED.description,
                              repo_id = COALESCE(EXCLUDED.repo_id, projects.repo_id),
                              owner = EXCLUDED.owner, forks = EXCLUDED.forks,
                              watchers = EXCLUDED.watchers
                RETURNING *
                "#,
            )
        }
        .bind(Uuid::new_v4())
        .bind(repo.service.to_string())
        .bind(&repo.url)
        .bind(&repo.name)
        .bind(&repo.slug)
        .bind(&repo.description)
        .bind(repo.repo_id)
        .bind(&repo.owner)
        .bind(repo.forks)
        .bind(repo.watchers)
        .fetch_one(self.tx.as_mut())
        .await?;

        Ok(project)
    }

    async fn set_project_active(
        &mut self,
        project_id: Uuid,
        is_active: bool,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE projects SET is_active = $2 WHERE id = $1")
            .bind(project_id)
            .bind(is_active)
            .execute(self.tx.as_mut())
            .await?;
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, avatar_url, is_active)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.avatar_url)
        .bind(user.is_active)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn update_user_profile(
        &mut self,
        user_id: Uuid,
        name: &str,
        avatar_url: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET name = $2, avatar_url = COALESCE($3, avatar_url) WHERE id = $1")
            .bind(user_id)
            .bind(name)
            .bind(avatar_url)
            .execute(self.tx.as_mut())
            .await?;
        Ok(())
    }

    async fn set_user_active(&mut self, user_id: Uuid, is_active: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET is_active = $2 WHERE id = $1")
            .bind(user_id)
            .bind(is_active)
            .execute(self.tx.as_mut())
            .await?;
        Ok(())
    }

    async fn find_user_by_identifier(
        &mut self,
        identifier_type: &str,
        value: &str,
    ) -> anyhow::Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT u.*
            FROM users u
            JOIN user_identifiers ui ON ui.user_id = u.id
            WHERE ui.identifier_type = $1 AND ui.value = $2
            "#,
        )
        .bind(identifier_type)
        .bind(value)
        .fetch_optional(self.tx.as_mut())
        .await?)
    }

    async fn link_identifier(
        &mut self,
        user_id: Uuid,
        identifier_type: &str,
        value: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_identifiers (id, user_id, identifier_type, value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (identifier_type, value) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(identifier_type)
        .bind(value)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn insert_commit(&mut self, commit: &Commit) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO commits (id, hash, project_id, user_id, game_id, author_name,
                                 author_email, author_username, message, committed_at,
                                 url, languages, files)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (hash) DO NOTHING
            "#,
        )
        .bind(commit.id)
        .bind(&commit.hash)
        .bind(commit.project_id)
        .bind(commit.user_id)
        .bind(commit.game_id)
        .bind(&commit.author_name)
        .bind(&commit.author_email)
        .bind(&commit.author_username)
        .bind(&commit.message)
        .bind(commit.committed_at)
        .bind(&commit.url)
        .bind(&commit.languages)
        .bind(&commit.files)
        .execute(self.tx.as_mut())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_commit_game(&mut self, commit_id: Uuid, game_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE commits SET game_id = $2 WHERE id = $1")
            .bind(commit_id)
            .bind(game_id)
            .execute(self.tx.as_mut())
            .await?;
        Ok(())
    }

    async fn attribute_commit(&mut self, commit_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE commits SET user_id = $2 WHERE id = $1 AND user_id IS NULL")
                .bind(commit_id)
                .bind(user_id)
                .execute(self.tx.as_mut())
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_orphan_commits_by_emails(
        &mut self,
        emails: &[String],
    ) -> anyhow::Result<Vec<Commit>> {
        Ok(sqlx::query_as::<_, Commit>(
            r#"
            SELECT * FROM commits
            WHERE user_id IS NULL AND author_email = ANY($1)
            ORDER BY committed_at ASC
            "#,
        )
        .bind(emails)
        .fetch_all(self.tx.as_mut())
        .await?)
    }

    async fn find_claimable_orphans(&mut self) -> anyhow::Result<Vec<(Commit, Uuid)>> {
        let rows = sqlx::query(
            r#"
            SELECT c.*, ui.user_id AS claimant
            FROM commits c
            JOIN user_identifiers ui
              ON ui.identifier_type = 'email' AND ui.value = c.author_email
            WHERE c.user_id IS NULL
            ORDER BY c.committed_at ASC
            "#,
        )
        .fetch_all(self.tx.as_mut())
        .await?;

        let mut claimable = Vec::with_capacity(rows.len());
        for row in rows {
            let claimant: Uuid = row.try_get("claimant")?;
            claimable.push((Commit::from_row(&row)?, claimant));
        }
        Ok(claimable)
    }

    async fn count_user_commits_in_game(
        &mut self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<i64> {
        let row =
            sqlx::query("SELECT COUNT(*) AS total FROM commits WHERE game_id = $1 AND user_id = $2")
                .bind(game_id)
                .bind(user_id)
                .fetch_one(self.tx.as_mut())
                .await?;
        Ok(row.try_get("total")?)
    }

    async fn lock_board(
        &mut self,
        game_id: Uuid,
        project_id: Uuid,
    ) -> anyhow::Result<Option<Board>> {
        Ok(sqlx::query_as::<_, Board>(
            "SELECT * FROM boards WHERE game_id = $1 AND project_id = $2 FOR UPDATE",
        )
        .bind(game_id)
        .bind(project_id)
        .fetch_optional(self.tx.as_mut())
        .await?)
    }

    async fn insert_board(&mut self, board: &Board) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO boards (id, game_id, project_id, points, potential_points,
                                verified_points, commit_count, contributor_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(board.id)
        .bind(board.game_id)
        .bind(board.project_id)
        .bind(board.points)
        .bind(board.potential_points)
        .bind(board.verified_points)
        .bind(board.commit_count)
        .bind(board.contributor_count)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn update_board(&mut self, board: &Board) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE boards
            SET points = $2, potential_points = $3, verified_points = $4,
                commit_count = $5, contributor_count = $6
            WHERE id = $1
            "#,
        )
        .bind(board.id)
        .bind(board.points)
        .bind(board.potential_points)
        .bind(board.verified_points)
        .bind(board.commit_count)
        .bind(board.contributor_count)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn get_or_create_language(&mut self, name: &str) -> anyhow::Result<Language> {
        sqlx::query("INSERT INTO languages (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
            .bind(Uuid::new_v4())
            .bind(name)
            .execute(self.tx.as_mut())
            .await?;

        Ok(
            sqlx::query_as::<_, Language>("SELECT * FROM languages WHERE name = $1")
                .bind(name)
                .fetch_one(self.tx.as_mut())
                .await?,
        )
    }

    async fn lock_language_board(
        &mut self,
        game_id: Uuid,
        language_id: Uuid,
    ) -> anyhow::Result<Option<LanguageBoard>> {
        Ok(sqlx::query_as::<_, LanguageBoard>(
            "SELECT * FROM language_boards WHERE game_id = $1 AND language_id = $2 FOR UPDATE",
        )
        .bind(game_id)
        .bind(language_id)
        .fetch_optional(self.tx.as_mut())
        .await?)
    }

    async fn insert_language_board(&mut self, board: &LanguageBoard) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO language_boards (id, game_id, language_id, points, commit_count)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(board.id)
        .bind(board.game_id)
        .bind(board.language_id)
        .bind(board.points)
        .bind(board.commit_count)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn update_language_board(&mut self, board: &LanguageBoard) -> anyhow::Result<()> {
        sqlx::query("UPDATE language_boards SET points = $2, commit_count = $3 WHERE id = $1")
            .bind(board.id)
            .bind(board.points)
            .bind(board.commit_count)
            .execute(self.tx.as_mut())
            .await?;
        Ok(())
    }

    async fn lock_player(
        &mut self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<Player>> {
        Ok(sqlx::query_as::<_, Player>(
            "SELECT * FROM players WHERE game_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(game_id)
        .bind(user_id)
        .fetch_optional(self.tx.as_mut())
        .await?)
    }

    async fn lock_player_by_id(&mut self, player_id: Uuid) -> anyhow::Result<Option<Player>> {
        Ok(
            sqlx::query_as::<_, Player>("SELECT * FROM players WHERE id = $1 FOR UPDATE")
                .bind(player_id)
                .fetch_optional(self.tx.as_mut())
                .await?,
        )
    }

    async fn insert_player(&mut self, player: &Player) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO players (id, game_id, user_id, points, potential_points,
                                 verified_points, commit_count, project_count, ai_analysis_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(player.id)
        .bind(player.game_id)
        .bind(player.user_id)
        .bind(player.points)
        .bind(player.potential_points)
        .bind(player.verified_points)
        .bind(player.commit_count)
        .bind(player.project_count)
        .bind(&player.ai_analysis_status)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn update_player(&mut self, player: &Player) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE players
            SET points = $2, potential_points = $3, verified_points = $4,
                commit_count = $5, project_count = $6, ai_analysis_status = $7
            WHERE id = $1
            "#,
        )
        .bind(player.id)
        .bind(player.points)
        .bind(player.potential_points)
        .bind(player.verified_points)
        .bind(player.commit_count)
        .bind(player.project_count)
        .bind(&player.ai_analysis_status)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn find_player_board(
        &mut self,
        player_id: Uuid,
        board_id: Uuid,
    ) -> anyhow::Result<Option<PlayerBoard>> {
        Ok(sqlx::query_as::<_, PlayerBoard>(
            "SELECT * FROM player_boards WHERE player_id = $1 AND board_id = $2",
        )
        .bind(player_id)
        .bind(board_id)
        .fetch_optional(self.tx.as_mut())
        .await?)
    }

    async fn insert_player_board(&mut self, player_board: &PlayerBoard) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO player_boards (id, player_id, board_id, commit_count)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(player_board.id)
        .bind(player_board.player_id)
        .bind(player_board.board_id)
        .bind(player_board.commit_count)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn update_player_board(&mut self, player_board: &PlayerBoard) -> anyhow::Result<()> {
        sqlx::query("UPDATE player_boards SET commit_count = $2 WHERE id = $1")
            .bind(player_board.id)
            .bind(player_board.commit_count)
            .execute(self.tx.as_mut())
            .await?;
        Ok(())
    }
}

async fn run_migrations(rocket: Rocket<Build>) -> fairing::Result {
    match DB::fetch(&rocket) {
        Some(db) => match sqlx::migrate!("./migrations").run(&**db).await {
            Ok(_) => Ok(rocket),
            Err(e) => {
                rocket::error!("Failed to initialize SQLx database: {}", e);
                Err(rocket)
            }
        },
        None => Err(rocket),
    }
}

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("SQLx Stage", |rocket| async {
        rocket
            .attach(DB::init())
            .attach(AdHoc::try_on_ignite("SQLx Migrations", run_migrations))
    })
}
