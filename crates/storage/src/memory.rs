// In-memory storage implementation for dev mode
// Decision: Use parking_lot for thread-safe access
// Decision: UUIDs generated via uuid v7 (time-ordered)
//
// Mirrors the PostgreSQL repository so the control-plane and the workers
// can run without a database. Data is lost on restart.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use pulseboard_core::{EventType, NewEvent};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::*;

#[derive(Default)]
pub struct InMemoryDatabase {
    users: RwLock<HashMap<Uuid, UserRow>>,
    projects: RwLock<HashMap<Uuid, ProjectRow>>,
    events: RwLock<EventLog>,
}

#[derive(Default)]
struct EventLog {
    rows: HashMap<Uuid, EventRow>,
    // Last assigned received_at, keeps assignment strictly increasing
    last_received_at: Option<DateTime<Utc>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(&self, input: CreateUserRow) -> Result<UserRow> {
        let mut users = self.users.write();
        if users.values().any(|u| u.email == input.email) {
            return Err(anyhow!("user with email {} already exists", input.email));
        }
        let row = UserRow {
            id: Uuid::now_v7(),
            email: input.email,
            name: input.name,
            created_at: Utc::now(),
        };
        users.insert(row.id, row.clone());
        Ok(row)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    // ============================================
    // Projects
    // ============================================

    pub async fn create_project(&self, input: CreateProjectRow) -> Result<ProjectRow> {
        if !self.users.read().contains_key(&input.owner_user_id) {
            return Err(anyhow!("owner {} does not exist", input.owner_user_id));
        }
        let mut projects = self.projects.write();
        if projects.values().any(|p| p.api_key == input.api_key) {
            return Err(anyhow!("api key already in use"));
        }
        let row = ProjectRow {
            id: Uuid::now_v7(),
            name: input.name,
            api_key: input.api_key,
            owner_user_id: input.owner_user_id,
            created_at: Utc::now(),
        };
        projects.insert(row.id, row.clone());
        Ok(row)
    }

    pub async fn get_project_by_api_key(&self, api_key: &str) -> Result<Option<ProjectRow>> {
        Ok(self
            .projects
            .read()
            .values()
            .find(|p| p.api_key == api_key)
            .cloned())
    }

    pub async fn list_projects_for_user(&self, user_id: Uuid) -> Result<Vec<ProjectRow>> {
        let mut rows: Vec<ProjectRow> = self
            .projects
            .read()
            .values()
            .filter(|p| p.owner_user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.created_at, p.id));
        Ok(rows)
    }

    pub async fn is_project_owner(&self, project_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .projects
            .read()
            .get(&project_id)
            .is_some_and(|p| p.owner_user_id == user_id))
    }

    pub async fn get_project_owner(&self, project_id: Uuid) -> Result<Option<ProjectOwnerRow>> {
        let Some(project) = self.projects.read().get(&project_id).cloned() else {
            return Ok(None);
        };
        Ok(self
            .users
            .read()
            .get(&project.owner_user_id)
            .map(|user| ProjectOwnerRow {
                project_id: project.id,
                project_name: project.name,
                user_id: user.id,
                email: user.email.clone(),
                user_name: user.name.clone(),
            }))
    }

    pub async fn list_recipient_projects(&self) -> Result<Vec<RecipientProjectRow>> {
        let users = self.users.read();
        let projects = self.projects.read();
        let mut rows: Vec<(DateTime<Utc>, RecipientProjectRow)> = projects
            .values()
            .filter_map(|p| {
                users.get(&p.owner_user_id).map(|u| {
                    (
                        p.created_at,
                        RecipientProjectRow {
                            user_id: u.id,
                            email: u.email.clone(),
                            user_name: u.name.clone(),
                            project_id: p.id,
                            project_name: p.name.clone(),
                        },
                    )
                })
            })
            .collect();
        rows.sort_by_key(|(created_at, r)| (r.user_id, *created_at, r.project_id));
        Ok(rows.into_iter().map(|(_, r)| r).collect())
    }

    // ============================================
    // Events
    // ============================================

    pub async fn insert_event(&self, input: NewEvent) -> Result<EventRow> {
        if !self.projects.read().contains_key(&input.project_id) {
            return Err(anyhow!("project {} does not exist", input.project_id));
        }

        let mut log = self.events.write();
        let mut received_at = Utc::now();
        if let Some(last) = log.last_received_at {
            if received_at <= last {
                received_at = last + Duration::microseconds(1);
            }
        }
        log.last_received_at = Some(received_at);

        let row = EventRow {
            id: Uuid::now_v7(),
            project_id: input.project_id,
            event_type: input.event_type.as_str().to_string(),
            name: input.name,
            payload: input.payload,
            timestamp: input.timestamp,
            received_at,
        };
        log.rows.insert(row.id, row.clone());
        Ok(row)
    }

    pub async fn list_recent_events(&self, project_id: Uuid, limit: i64) -> Result<Vec<EventRow>> {
        let log = self.events.read();
        let mut rows: Vec<EventRow> = log
            .rows
            .values()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.received_at
                .cmp(&a.received_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    pub async fn count_events(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
    ) -> Result<i64> {
        let type_filter = event_type.map(|t| t.as_str());
        let count = self
            .events
            .read()
            .rows
            .values()
            .filter(|e| e.project_id == project_id && e.timestamp >= since)
            .filter(|e| type_filter.map_or(true, |t| e.event_type == t))
            .count();
        Ok(count as i64)
    }

    pub async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut log = self.events.write();
        let before = log.rows.len();
        log.rows.retain(|_, e| e.timestamp >= cutoff);
        Ok((before - log.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> (InMemoryDatabase, ProjectRow) {
        let db = InMemoryDatabase::new();
        let user = db
            .create_user(CreateUserRow {
                email: "owner@example.com".into(),
                name: "Owner".into(),
            })
            .await
            .unwrap();
        let project = db
            .create_project(CreateProjectRow {
                name: "Shop".into(),
                api_key: "pb_test".into(),
                owner_user_id: user.id,
            })
            .await
            .unwrap();
        (db, project)
    }

    fn event(project_id: Uuid, event_type: EventType, timestamp: DateTime<Utc>) -> NewEvent {
        NewEvent::new(project_id, event_type, "e", Some(json!({})), Some(timestamp))
    }

    #[tokio::test]
    async fn test_received_at_strictly_increases() {
        let (db, project) = seeded().await;
        let now = Utc::now();
        let mut last = None;
        for _ in 0..50 {
            let row = db
                .insert_event(event(project.id, EventType::Event, now))
                .await
                .unwrap();
            if let Some(prev) = last {
                assert!(row.received_at > prev);
            }
            last = Some(row.received_at);
        }
    }

    #[tokio::test]
    async fn test_recent_events_newest_first_with_limit() {
        let (db, project) = seeded().await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            let row = db
                .insert_event(event(project.id, EventType::Event, Utc::now()))
                .await
                .unwrap();
            ids.push(row.id);
        }
        let recent = db.list_recent_events(project.id, 3).await.unwrap();
        let got: Vec<Uuid> = recent.iter().map(|r| r.id).collect();
        assert_eq!(got, vec![ids[4], ids[3], ids[2]]);
    }

    #[tokio::test]
    async fn test_count_events_filters_type_and_window() {
        let (db, project) = seeded().await;
        let now = Utc::now();
        db.insert_event(event(project.id, EventType::Error, now))
            .await
            .unwrap();
        db.insert_event(event(project.id, EventType::Error, now - Duration::minutes(5)))
            .await
            .unwrap();
        db.insert_event(event(project.id, EventType::Metric, now))
            .await
            .unwrap();

        let since = now - Duration::seconds(60);
        assert_eq!(
            db.count_events(project.id, since, Some(EventType::Error))
                .await
                .unwrap(),
            1
        );
        assert_eq!(db.count_events(project.id, since, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_events_before_is_strict() {
        let (db, project) = seeded().await;
        let cutoff = Utc::now() - Duration::days(30);
        db.insert_event(event(project.id, EventType::Event, cutoff - Duration::seconds(1)))
            .await
            .unwrap();
        db.insert_event(event(project.id, EventType::Event, cutoff))
            .await
            .unwrap();

        assert_eq!(db.delete_events_before(cutoff).await.unwrap(), 1);
        assert_eq!(db.delete_events_before(cutoff).await.unwrap(), 0);
        assert_eq!(db.list_recent_events(project.id, 20).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_event_for_unknown_project_fails() {
        let db = InMemoryDatabase::new();
        let result = db
            .insert_event(event(Uuid::now_v7(), EventType::Event, Utc::now()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ownership_lookups() {
        let (db, project) = seeded().await;
        assert!(db
            .is_project_owner(project.id, project.owner_user_id)
            .await
            .unwrap());
        assert!(!db.is_project_owner(project.id, Uuid::now_v7()).await.unwrap());

        let owner = db.get_project_owner(project.id).await.unwrap().unwrap();
        assert_eq!(owner.email, "owner@example.com");
        assert_eq!(owner.project_name, "Shop");
        assert!(db.get_project_owner(Uuid::now_v7()).await.unwrap().is_none());
    }
}
