use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;

/// One engine per semester, opened on first use.
/// The semester is the database name of the pgwire connection.
pub struct SemesterManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    shutdown: CancellationToken,
}

/// Keep only characters that are safe in a file name.
pub fn sanitize_semester_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl SemesterManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            shutdown: CancellationToken::new(),
        }
    }

    /// Engines are keyed by the sanitized name, so aliases of one WAL file
    /// share one engine.
    pub fn get_or_create(&self, semester: &str) -> std::io::Result<Arc<Engine>> {
        if semester.len() > MAX_SEMESTER_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "semester name too long",
            ));
        }
        let safe_name = sanitize_semester_name(semester);
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty semester name",
            ));
        }
        if let Some(engine) = self.engines.get(&safe_name) {
            return Ok(engine.value().clone());
        }

        if self.engines.len() >= MAX_SEMESTERS {
            return Err(std::io::Error::other("too many semesters"));
        }

        // Entry lock: two first connections to one semester must share an engine.
        let entry = self.engines.entry(safe_name.clone());
        if let dashmap::mapref::entry::Entry::Occupied(e) = &entry {
            return Ok(e.get().clone());
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::new(wal_path)?);
        tokio::spawn(compactor::run_compactor(
            engine.clone(),
            self.compact_threshold,
            self.shutdown.child_token(),
        ));
        entry.or_insert(engine.clone());

        metrics::gauge!(crate::observability::SEMESTERS_ACTIVE).set(self.engines.len() as f64);
        tracing::info!(semester, wal = %safe_name, "opened semester");
        Ok(engine)
    }

    pub fn open_semesters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Stop every compactor.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Day;
    use crate::testing::proposal;
    use std::fs;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("timetable_test_semester").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn semesters_are_isolated() {
        let sm = SemesterManager::new(test_data_dir("isolation"), 1000);
        let fall = sm.get_or_create("fall_2026").unwrap();
        let spring = sm.get_or_create("spring_2027").unwrap();

        fall.create_room(1, "A-101".into(), 30).await.unwrap();
        spring.create_room(1, "A-101".into(), 30).await.unwrap();
        fall.create_schedule(proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
            .await
            .unwrap();

        // Same slot is free in the other semester.
        spring
            .create_schedule(proposal(2, 10, 1, 200, Day::Monday, "09:00", "10:30"), None)
            .await
            .unwrap();
        assert_eq!(fall.schedule_count(), 1);
        assert_eq!(spring.schedule_count(), 1);
    }

    #[tokio::test]
    async fn lazily_creates_wal() {
        let dir = test_data_dir("lazy");
        let sm = SemesterManager::new(dir.clone(), 1000);
        assert!(fs::read_dir(&dir).unwrap().next().is_none());
        sm.get_or_create("fall_2026").unwrap();
        assert!(dir.join("fall_2026.wal").exists());
        assert_eq!(sm.open_semesters(), vec!["fall_2026".to_string()]);
    }

    #[tokio::test]
    async fn same_engine_returned() {
        let sm = SemesterManager::new(test_data_dir("same"), 1000);
        let a = sm.get_or_create("fall").unwrap();
        let b = sm.get_or_create("fall").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn names_are_sanitized() {
        let dir = test_data_dir("sanitize");
        let sm = SemesterManager::new(dir.clone(), 1000);
        sm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());
        assert!(sm.get_or_create("../..").is_err());
    }

    #[tokio::test]
    async fn names_sharing_a_wal_share_an_engine() {
        let dir = test_data_dir("alias");
        let sm = SemesterManager::new(dir.clone(), 1000);
        let plain = sm.get_or_create("fall2026").unwrap();
        let dotted = sm.get_or_create("fall.2026").unwrap();
        assert!(Arc::ptr_eq(&plain, &dotted));
        assert_eq!(sm.open_semesters(), vec!["fall2026".to_string()]);

        plain.create_room(1, "A".into(), 30).await.unwrap();
        assert!(matches!(
            dotted.create_room(1, "B".into(), 20).await,
            Err(crate::engine::EngineError::AlreadyExists { .. })
        ));
        sm.shutdown();

        let reopened = Engine::new(dir.join("fall2026.wal")).unwrap();
        let rooms = reopened.rooms_by_name();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "A");
    }

    #[tokio::test]
    async fn name_too_long() {
        let sm = SemesterManager::new(test_data_dir("too_long"), 1000);
        let err = sm
            .get_or_create(&"x".repeat(MAX_SEMESTER_NAME_LEN + 1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("semester name too long"));
    }

    #[tokio::test]
    async fn semester_count_is_capped() {
        let sm = SemesterManager::new(test_data_dir("cap"), 1000);
        for i in 0..MAX_SEMESTERS {
            sm.get_or_create(&format!("s{i}")).unwrap();
        }
        let err = sm.get_or_create("one_more").err().unwrap();
        assert!(err.to_string().contains("too many semesters"));
        sm.shutdown();
    }
}
