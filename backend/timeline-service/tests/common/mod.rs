//! In-memory repositories and cache stores shared by the integration tests
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use timeline_cache::{CacheError, CacheResult, CacheStore};
use timeline_service::config::TimelineConfig;
use timeline_service::models::{Post, Visibility};
use timeline_service::repository::{
    CandidateSource, InteractionRepository, PostRepository, RelationshipRepository,
};
use timeline_service::services::cursor::{newest_first, FeedCursor};
use timeline_service::services::TimelineService;
use uuid::Uuid;

#[derive(Default)]
struct Graph {
    posts: Vec<Post>,
    connections: HashSet<(Uuid, Uuid)>,
    circles: HashMap<Uuid, HashSet<Uuid>>,
    groups: HashMap<Uuid, HashSet<Uuid>>,
    last_activity: HashMap<Uuid, DateTime<Utc>>,
    engagements: Vec<(Uuid, Uuid, DateTime<Utc>)>,
}

/// Posts, relationships and engagement history in one in-process store
#[derive(Default)]
pub struct InMemoryRepository {
    graph: Mutex<Graph>,
    fail_posts: AtomicBool,
    fetches: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_post(&self, post: Post) {
        self.graph.lock().unwrap().posts.push(post);
    }

    pub fn connect(&self, a: Uuid, b: Uuid) {
        self.graph.lock().unwrap().connections.insert((a, b));
    }

    pub fn join_circle(&self, user: Uuid, circle: Uuid) {
        self.graph
            .lock()
            .unwrap()
            .circles
            .entry(user)
            .or_default()
            .insert(circle);
    }

    pub fn join_group(&self, user: Uuid, group: Uuid) {
        self.graph
            .lock()
            .unwrap()
            .groups
            .entry(user)
            .or_default()
            .insert(group);
    }

    pub fn set_last_activity(&self, user: Uuid, at: DateTime<Utc>) {
        self.graph.lock().unwrap().last_activity.insert(user, at);
    }

    pub fn engage(&self, user: Uuid, post_id: Uuid, at: DateTime<Utc>) {
        self.graph.lock().unwrap().engagements.push((user, post_id, at));
    }

    pub fn fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }

    /// Number of candidate fetches served so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn members(map: &HashMap<Uuid, HashSet<Uuid>>, ids: &[Uuid]) -> HashSet<Uuid> {
        map.iter()
            .filter(|(_, joined)| ids.iter().any(|id| joined.contains(id)))
            .map(|(user, _)| *user)
            .collect()
    }
}

#[async_trait]
impl PostRepository for InMemoryRepository {
    async fn fetch_candidates(
        &self,
        source: &CandidateSource,
        before: Option<FeedCursor>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_posts.load(Ordering::SeqCst) {
            bail!("connection refused");
        }

        let graph = self.graph.lock().unwrap();
        let mut posts: Vec<Post> = graph
            .posts
            .iter()
            .filter(|p| source.matches(p))
            .filter(|p| before.map_or(true, |c| c.admits(p)))
            .cloned()
            .collect();
        posts.sort_by(newest_first);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn find_by_id(&self, post_id: Uuid) -> Result<Option<Post>> {
        if self.fail_posts.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        let graph = self.graph.lock().unwrap();
        Ok(graph.posts.iter().find(|p| p.id == post_id).cloned())
    }
}

#[async_trait]
impl RelationshipRepository for InMemoryRepository {
    async fn accepted_connection_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let graph = self.graph.lock().unwrap();
        Ok(graph
            .connections
            .iter()
            .filter_map(|(a, b)| match (*a == user_id, *b == user_id) {
                (true, _) => Some(*b),
                (_, true) => Some(*a),
                _ => None,
            })
            .collect())
    }

    async fn circle_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let graph = self.graph.lock().unwrap();
        Ok(graph.circles.get(&user_id).cloned().unwrap_or_default())
    }

    async fn group_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let graph = self.graph.lock().unwrap();
        Ok(graph.groups.get(&user_id).cloned().unwrap_or_default())
    }

    async fn last_activity_at(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let graph = self.graph.lock().unwrap();
        Ok(graph.last_activity.get(&user_id).copied())
    }

    async fn circle_member_ids(&self, circle_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        let graph = self.graph.lock().unwrap();
        Ok(Self::members(&graph.circles, circle_ids))
    }

    async fn group_member_ids(&self, group_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        let graph = self.graph.lock().unwrap();
        Ok(Self::members(&graph.groups, group_ids))
    }
}

#[async_trait]
impl InteractionRepository for InMemoryRepository {
    async fn recent_interaction_counts(
        &self,
        viewer_id: Uuid,
        author_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, u32>> {
        let graph = self.graph.lock().unwrap();
        let mut counts = HashMap::new();
        for (user, post_id, at) in &graph.engagements {
            if *user != viewer_id || *at < since {
                continue;
            }
            if let Some(post) = graph.posts.iter().find(|p| p.id == *post_id) {
                if author_ids.contains(&post.author_id) {
                    *counts.entry(post.author_id).or_insert(0) += 1;
                }
            }
        }
        Ok(counts)
    }
}

/// Cache store whose backend is always down
pub struct FailingCacheStore;

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(CacheError::Unavailable("redis down".to_string()))
    }

    async fn put(&self, _key: &str, _value: &str, _ttl_secs: u64) -> CacheResult<()> {
        Err(CacheError::Unavailable("redis down".to_string()))
    }

    async fn delete(&self, _keys: &[String]) -> CacheResult<usize> {
        Err(CacheError::Unavailable("redis down".to_string()))
    }

    async fn delete_by_pattern(&self, _pattern: &str) -> CacheResult<usize> {
        Err(CacheError::Unavailable("redis down".to_string()))
    }

    async fn index_add(&self, _index_key: &str, _member: &str, _ttl_secs: u64) -> CacheResult<()> {
        Err(CacheError::Unavailable("redis down".to_string()))
    }

    async fn index_members(&self, _index_key: &str) -> CacheResult<Vec<String>> {
        Err(CacheError::Unavailable("redis down".to_string()))
    }

    async fn ping(&self) -> CacheResult<()> {
        Err(CacheError::Unavailable("redis down".to_string()))
    }
}

pub fn service(repo: &Arc<InMemoryRepository>, store: Arc<dyn CacheStore>) -> TimelineService {
    TimelineService::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        store,
        TimelineConfig::default(),
    )
}

pub fn post(author: Uuid, visibility: Visibility, age: Duration) -> Post {
    Post {
        id: Uuid::new_v4(),
        author_id: author,
        content: "Reunion planning thread".to_string(),
        visibility,
        circle_ids: vec![],
        group_ids: vec![],
        created_at: Utc::now() - age,
        engagement_count: 0,
    }
}
