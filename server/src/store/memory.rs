//! In-memory store used by the scoring and ingestion tests.
//!
//! One tokio mutex guards the whole state and is held for the lifetime of a
//! transaction: a coarser serialization than per-row locks but with the same
//! guarantees, and mutations stage against a copy that only replaces the
//! shared state on `commit`.

use std::sync::Arc;

use anyhow::{bail, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::RepoData;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::db::types::{
    Board, BoardStanding, Commit, Game, Language, LanguageBoard, LanguageStanding, Player,
    PlayerBoard, PlayerStanding, Project, User, UserIdentifier,
};
use crate::store::{Store, StoreTx};

#[derive(Debug, Clone, Default)]
pub struct MemState {
    pub games: Vec<Game>,
    pub projects: Vec<Project>,
    pub users: Vec<User>,
    pub identifiers: Vec<UserIdentifier>,
    pub commits: Vec<Commit>,
    pub players: Vec<Player>,
    pub boards: Vec<Board>,
    pub languages: Vec<Language>,
    pub language_boards: Vec<LanguageBoard>,
    pub player_boards: Vec<PlayerBoard>,
}

#[derive(Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<MemState>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MemState {
        self.state.lock().await.clone()
    }
}

pub struct MemTx {
    guard: OwnedMutexGuard<MemState>,
    staged: MemState,
}

#[async_trait]
impl Store for MemStore {
    type Tx = MemTx;

    async fn begin(&self) -> anyhow::Result<MemTx> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemTx { guard, staged })
    }

    async fn find_game(&self, game_id: Uuid) -> anyhow::Result<Option<Game>> {
        let state = self.state.lock().await;
        Ok(state.games.iter().find(|game| game.id == game_id).cloned())
    }

    async fn active_game(&self, at: DateTime<Utc>) -> anyhow::Result<Option<Game>> {
        let state = self.state.lock().await;
        Ok(active_game_in(&state, at))
    }

    async fn latest_ended_game(&self, at: DateTime<Utc>) -> anyhow::Result<Option<Game>> {
        let state = self.state.lock().await;
        Ok(state
            .games
            .iter()
            .filter(|game| game.end_at <= at)
            .max_by_key(|game| game.end_at)
            .cloned())
    }

    async fn player_leaderboard(
        &self,
        game_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<PlayerStanding>> {
        let state = self.state.lock().await;
        let mut standings: Vec<PlayerStanding> = state
            .players
            .iter()
            .filter(|player| player.game_id == game_id)
            .filter_map(|player| {
                let user = state
                    .users
                    .iter()
                    .find(|user| user.id == player.user_id && user.is_active)?;
                Some(PlayerStanding {
                    user_id: user.id,
                    name: user.name.clone(),
                    points: player.points,
                    potential_points: player.potential_points,
                    verified_points: player.verified_points,
                    commit_count: player.commit_count,
                    project_count: player.project_count,
                })
            })
            .collect();
        standings.sort_by(|a, b| {
            (b.verified_points, b.potential_points).cmp(&(a.verified_points, a.potential_points))
        });
        standings.truncate(limit as usize);
        Ok(standings)
    }

    async fn project_leaderboard(
        &self,
        game_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<BoardStanding>> {
        let state = self.state.lock().await;
        let mut standings: Vec<BoardStanding> = state
            .boards
            .iter()
            .filter(|board| board.game_id == game_id)
            .filter_map(|board| {
                let project = state
                    .projects
                    .iter()
                    .find(|project| project.id == board.project_id && project.is_active)?;
                Some(BoardStanding {
                    project_id: project.id,
                    name: project.name.clone(),
                    slug: project.slug.clone(),
                    points: board.points,
                    potential_points: board.potential_points,
                    verified_points: board.verified_points,
                    commit_count: board.commit_count,
                    contributor_count: board.contributor_count,
                })
            })
            .collect();
        standings.sort_by(|a, b| {
            (b.verified_points, b.potential_points).cmp(&(a.verified_points, a.potential_points))
        });
        standings.truncate(limit as usize);
        Ok(standings)
    }

    async fn language_leaderboard(
        &self,
        game_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<LanguageStanding>> {
        let state = self.state.lock().await;
        let mut standings: Vec<LanguageStanding> = state
            .language_boards
            .iter()
            .filter(|board| board.game_id == game_id)
            .filter_map(|board| {
                let language = state
                    .languages
                    .iter()
                    .find(|language| language.id == board.language_id)?;
                Some(LanguageStanding {
                    name: language.name.clone(),
                    points: board.points,
                    commit_count: board.commit_count,
                })
            })
            .collect();
        standings.sort_by(|a, b| b.points.cmp(&a.points));
        standings.truncate(limit as usize);
        Ok(standings)
    }
}

fn active_game_in(state: &MemState, at: DateTime<Utc>) -> Option<Game> {
    state
        .games
        .iter()
        .filter(|game| game.is_active && game.contains(at))
        .min_by_key(|game| game.end_at)
        .cloned()
}

#[async_trait]
impl StoreTx for MemTx {
    async fn commit(mut self) -> anyhow::Result<()> {
        *self.guard = self.staged;
        Ok(())
    }

    async fn insert_game(&mut self, game: &Game) -> anyhow::Result<()> {
        ensure!(game.start_at < game.end_at, "games_window check violation");
        self.staged.games.push(game.clone());
        Ok(())
    }

    async fn deactivate_games_except(&mut self, keep: Uuid) -> anyhow::Result<()> {
        for game in &mut self.staged.games {
            if game.id != keep {
                game.is_active = false;
            }
        }
        Ok(())
    }

    async fn find_game_by_id(&mut self, game_id: Uuid) -> anyhow::Result<Option<Game>> {
        Ok(self
            .staged
            .games
            .iter()
            .find(|game| game.id == game_id)
            .cloned())
    }

    async fn find_active_game_at(&mut self, at: DateTime<Utc>) -> anyhow::Result<Option<Game>> {
        Ok(active_game_in(&self.staged, at))
    }

    async fn upsert_project(&mut self, repo: &RepoData) -> anyhow::Result<Project> {
        let service = repo.service.to_string();
        if let Some(repo_id) = repo.repo_id {
            if let Some(project) = self
                .staged
                .projects
                .iter_mut()
                .find(|project| project.service == service && project.repo_id == Some(repo_id))
            {
                project.url = repo.url.clone();
                project.name = repo.name.clone();
                project.slug = repo.slug.clone();
                project.description = repo.description.clone();
                project.owner = repo.owner.clone();
                project.forks = repo.forks;
                project.watchers = repo.watchers;
                return Ok(project.clone());
            }
            if self
                .staged
                .projects
                .iter()
                .any(|project| project.slug == repo.slug)
            {
                bail!("projects_slug unique violation for {}", repo.slug);
            }
        } else if let Some(project) = self
            .staged
            .projects
            .iter_mut()
            .find(|project| project.slug == repo.slug)
        {
            project.url = repo.url.clone();
            project.name = repo.name.clone();
            project.description = repo.description.clone();
            project.owner = repo.owner.clone();
            project.forks = repo.forks;
            project.watchers = repo.watchers;
            return Ok(project.clone());
        }

        let project = Project {
            id: Uuid::new_v4(),
            service,
            url: repo.url.clone(),
            name: repo.name.clone(),
            slug: repo.slug.clone(),
            description: repo.description.clone(),
            repo_id: repo.repo_id,
            owner: repo.owner.clone(),
            forks: repo.forks,
            watchers: repo.watchers,
            is_active: true,
        };
        self.staged.projects.push(project.clone());
        Ok(project)
    }

    async fn set_project_active(
        &mut self,
        project_id: Uuid,
        is_active: bool,
    ) -> anyhow::Result<()> {
        if let Some(project) = self
            .staged
            .projects
            .iter_mut()
            .find(|project| project.id == project_id)
        {
            project.is_active = is_active;
        }
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> anyhow::Result<()> {
        self.staged.users.push(user.clone());
        Ok(())
    }

    async fn update_user_profile(
        &mut self,
        user_id: Uuid,
        name: &str,
        avatar_url: Option<&str>,
    ) -> anyhow::Result<()> {
        if let Some(user) = self.staged.users.iter_mut().find(|user| user.id == user_id) {
            user.name = name.to_string();
            if let Some(avatar_url) = avatar_url {
                user.avatar_url = Some(avatar_url.to_string());
            }
        }
        Ok(())
    }

    async fn set_user_active(&mut self, user_id: Uuid, is_active: bool) -> anyhow::Result<()> {
        if let Some(user) = self.staged.users.iter_mut().find(|user| user.id == user_id) {
            user.is_active = is_active;
        }
        Ok(())
    }

    async fn find_user_by_identifier(
        &mut self,
        identifier_type: &str,
        value: &str,
    ) -> anyhow::Result<Option<User>> {
        let Some(identifier) = self
            .staged
            .identifiers
            .iter()
            .find(|id| id.identifier_type == identifier_type && id.value == value)
        else {
            return Ok(None);
        };
        Ok(self
            .staged
            .users
            .iter()
            .find(|user| user.id == identifier.user_id)
            .cloned())
    }

    async fn link_identifier(
        &mut self,
        user_id: Uuid,
        identifier_type: &str,
        value: &str,
    ) -> anyhow::Result<()> {
        let exists = self
            .staged
            .identifiers
            .iter()
            .any(|id| id.identifier_type == identifier_type && id.value == value);
        if !exists {
            self.staged.identifiers.push(UserIdentifier {
                id: Uuid::new_v4(),
                user_id,
                identifier_type: identifier_type.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_commit(&mut self, commit: &Commit) -> anyhow::Result<bool> {
        if self
            .staged
            .commits
            .iter()
            .any(|existing| existing.hash == commit.hash)
        {
            return Ok(false);
        }
        self.staged.commits.push(commit.clone());
        Ok(true)
    }

    async fn set_commit_game(&mut self, commit_id: Uuid, game_id: Uuid) -> anyhow::Result<()> {
        if let Some(commit) = self
            .staged
            .commits
            .iter_mut()
            .find(|commit| commit.id == commit_id)
        {
            commit.game_id = Some(game_id);
        }
        Ok(())
    }

    async fn attribute_commit(&mut self, commit_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let Some(commit) = self
            .staged
            .commits
            .iter_mut()
            .find(|commit| commit.id == commit_id && commit.user_id.is_none())
        else {
            return Ok(false);
        };
        commit.user_id = Some(user_id);
        Ok(true)
    }

    async fn find_orphan_commits_by_emails(
        &mut self,
        emails: &[String],
    ) -> anyhow::Result<Vec<Commit>> {
        Ok(self
            .staged
            .commits
            .iter()
            .filter(|commit| commit.user_id.is_none() && emails.contains(&commit.author_email))
            .cloned()
            .collect())
    }

    async fn find_claimable_orphans(&mut self) -> anyhow::Result<Vec<(Commit, Uuid)>> {
        let mut claimable = Vec::new();
        for commit in self
            .staged
            .commits
            .iter()
            .filter(|commit| commit.user_id.is_none())
        {
            if let Some(identifier) = self
                .staged
                .identifiers
                .iter()
                .find(|id| id.identifier_type == "email" && id.value == commit.author_email)
            {
                claimable.push((commit.clone(), identifier.user_id));
            }
        }
        Ok(claimable)
    }

    async fn count_user_commits_in_game(
        &mut self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<i64> {
        Ok(self
            .staged
            .commits
            .iter()
            .filter(|commit| {
                commit.game_id == Some(game_id) && commit.user_id == Some(user_id)
            })
            .count() as i64)
    }

    async fn lock_board(
        &mut self,
        game_id: Uuid,
        project_id: Uuid,
    ) -> anyhow::Result<Option<Board>> {
        Ok(self
            .staged
            .boards
            .iter()
            .find(|board| board.game_id == game_id && board.project_id == project_id)
            .cloned())
    }

    async fn insert_board(&mut self, board: &Board) -> anyhow::Result<()> {
        self.staged.boards.push(board.clone());
        Ok(())
    }

    async fn update_board(&mut self, board: &Board) -> anyhow::Result<()> {
        if let Some(existing) = self
            .staged
            .boards
            .iter_mut()
            .find(|existing| existing.id == board.id)
        {
            *existing = board.clone();
        }
        Ok(())
    }

    async fn get_or_create_language(&mut self, name: &str) -> anyhow::Result<Language> {
        if let Some(language) = self
            .staged
            .languages
            .iter()
            .find(|language| language.name == name)
        {
            return Ok(language.clone());
        }
        let language = Language {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.staged.languages.push(language.clone());
        Ok(language)
    }

    async fn lock_language_board(
        &mut self,
        game_id: Uuid,
        language_id: Uuid,
    ) -> anyhow::Result<Option<LanguageBoard>> {
        Ok(self
            .staged
            .language_boards
            .iter()
            .find(|board| board.game_id == game_id && board.language_id == language_id)
            .cloned())
    }

    async fn insert_language_board(&mut self, board: &LanguageBoard) -> anyhow::Result<()> {
        self.staged.language_boards.push(board.clone());
        Ok(())
    }

    async fn update_language_board(&mut self, board: &LanguageBoard) -> anyhow::Result<()> {
        if let Some(existing) = self
            .staged
            .language_boards
            .iter_mut()
            .find(|existing| existing.id == board.id)
        {
            *existing = board.clone();
        }
        Ok(())
    }

    async fn lock_player(
        &mut self,
        game_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<Player>> {
        Ok(self
            .staged
            .players
            .iter()
            .find(|player| player.game_id == game_id && player.user_id == user_id)
            .cloned())
    }

    async fn lock_player_by_id(&mut self, player_id: Uuid) -> anyhow::Result<Option<Player>> {
        Ok(self
            .staged
            .players
            .iter()
            .find(|player| player.id == player_id)
            .cloned())
    }

    async fn insert_player(&mut self, player: &Player) -> anyhow::Result<()> {
        if self
            .staged
            .players
            .iter()
            .any(|existing| {
                existing.game_id == player.game_id && existing.user_id == player.user_id
            })
        {
            bail!("players (game_id, user_id) unique violation");
        }
        self.staged.players.push(player.clone());
        Ok(())
    }

    async fn update_player(&mut self, player: &Player) -> anyhow::Result<()> {
        if let Some(existing) = self
            .staged
            .players
            .iter_mut()
            .find(|existing| existing.id == player.id)
        {
            *existing = player.clone();
        }
        Ok(())
    }

    async fn find_player_board(
        &mut self,
        player_id: Uuid,
        board_id: Uuid,
    ) -> anyhow::Result<Option<PlayerBoard>> {
        Ok(self
            .staged
            .player_boards
            .iter()
            .find(|pb| pb.player_id == player_id && pb.board_id == board_id)
            .cloned())
    }

    async fn insert_player_board(&mut self, player_board: &PlayerBoard) -> anyhow::Result<()> {
        self.staged.player_boards.push(player_board.clone());
        Ok(())
    }

    async fn update_player_board(&mut self, player_board: &PlayerBoard) -> anyhow::Result<()> {
        if let Some(existing) = self
            .staged
            .player_boards
            .iter_mut()
            .find(|existing| existing.id == player_board.id)
        {
            *existing = player_board.clone();
        }
        Ok(())
    }
}
