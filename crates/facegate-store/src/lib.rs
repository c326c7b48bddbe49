//! facegate-store: SQLite persistence for identities and face samples.
//!
//! Each identity holds at most one canonical descriptor (set by its first
//! enrollment) plus an append-only history of face samples. The store is the
//! [`DescriptorSource`] the matching engine reads from.

use chrono::{DateTime, Utc};
use facegate_core::{
    DescriptorSource, DisplayInfo, FaceDescriptor, Identity, MatchCandidate, SourceError,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown identity: {0}")]
    UnknownIdentity(Identity),
    #[error("handle already registered: {0}")]
    DuplicateHandle(String),
    #[error("corrupt descriptor blob: {0} bytes is not a whole number of f32 values")]
    CorruptDescriptor(usize),
    #[error("corrupt timestamp: {0}")]
    CorruptTimestamp(String),
}

/// Result of appending an enrollment sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollOutcome {
    pub identity: Identity,
    pub sample_id: i64,
    /// True when this sample became the identity's canonical descriptor.
    pub canonical_set: bool,
    pub fingerprint: String,
}

/// Historical face sample.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceSample {
    pub id: i64,
    pub identity: Identity,
    pub descriptor: FaceDescriptor,
    pub fingerprint: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySummary {
    pub id: Identity,
    pub display_name: String,
    pub handle: String,
    pub enrolled: bool,
    pub samples: usize,
    pub created_at: String,
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    handle TEXT NOT NULL UNIQUE,
    descriptor BLOB,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS face_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id TEXT NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
    descriptor BLOB NOT NULL,
    fingerprint TEXT NOT NULL,
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_face_samples_identity ON face_samples(identity_id);
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::init(Connection::open(path)?)?;
        tracing::info!(path = %path.display(), "face store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", 1)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Register a password-only identity; the id is a fresh UUID.
    pub fn register_identity(&self, display_name: &str, handle: &str) -> Result<Identity> {
        let identity = Identity::new(uuid::Uuid::new_v4().to_string());
        let inserted = self.conn.execute(
            "INSERT INTO identities (id, display_name, handle, descriptor, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4)",
            params![identity.as_str(), display_name, handle, Utc::now().to_rfc3339()],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateHandle(handle.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(identity = %identity, handle, "identity registered");
        Ok(identity)
    }

    /// Append a face sample; the first one also becomes the canonical descriptor.
    pub fn enroll(&mut self, identity: &Identity, descriptor: &FaceDescriptor) -> Result<EnrollOutcome> {
        let blob = descriptor_to_blob(descriptor);
        let fingerprint = fingerprint(&blob);
        let tx = self.conn.transaction()?;

        let current: Option<Option<Vec<u8>>> = tx
            .query_row(
                "SELECT descriptor FROM identities WHERE id = ?1",
                params![identity.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(StoreError::UnknownIdentity(identity.clone()));
        };

        tx.execute(
            "INSERT INTO face_samples (identity_id, descriptor, fingerprint, captured_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![identity.as_str(), blob, fingerprint, Utc::now().to_rfc3339()],
        )?;
        let sample_id = tx.last_insert_rowid();

        let canonical_set = current.is_none();
        if canonical_set {
            tx.execute(
                "UPDATE identities SET descriptor = ?2 WHERE id = ?1",
                params![identity.as_str(), blob],
            )?;
        }
        tx.commit()?;

        tracing::info!(
            identity = %identity,
            sample_id,
            canonical_set,
            dim = descriptor.len(),
            "face sample enrolled"
        );

        Ok(EnrollOutcome {
            identity: identity.clone(),
            sample_id,
            canonical_set,
            fingerprint,
        })
    }

    /// All samples of an identity, oldest first.
    pub fn samples(&self, identity: &Identity) -> Result<Vec<FaceSample>> {
        if !self.exists(identity)? {
            return Err(StoreError::UnknownIdentity(identity.clone()));
        }
        let mut stmt = self.conn.prepare(
            "SELECT id, descriptor, fingerprint, captured_at FROM face_samples
             WHERE identity_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![identity.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut samples = Vec::new();
        for row in rows {
            let (id, blob, fingerprint, captured_at) = row?;
            samples.push(FaceSample {
                id,
                identity: identity.clone(),
                descriptor: descriptor_from_blob(&blob)?,
                fingerprint,
                captured_at: parse_timestamp(&captured_at)?,
            });
        }
        Ok(samples)
    }

    /// Every identity in registration order.
    pub fn list_identities(&self) -> Result<Vec<IdentitySummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.display_name, i.handle, i.descriptor IS NOT NULL, i.created_at,
                    (SELECT COUNT(*) FROM face_samples s WHERE s.identity_id = i.id)
             FROM identities i ORDER BY i.rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IdentitySummary {
                id: Identity::new(row.get::<_, String>(0)?),
                display_name: row.get(1)?,
                handle: row.get(2)?,
                enrolled: row.get(3)?,
                created_at: row.get(4)?,
                samples: row.get::<_, i64>(5)? as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Remove an identity and its samples. Returns false if it did not exist.
    pub fn remove_identity(&self, identity: &Identity) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM identities WHERE id = ?1",
            params![identity.as_str()],
        )?;
        tracing::info!(identity = %identity, removed = removed > 0, "identity removal");
        Ok(removed > 0)
    }

    fn exists(&self, identity: &Identity) -> Result<bool> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM identities WHERE id = ?1",
                params![identity.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn canonical_descriptor(&self, identity: &Identity) -> Result<Option<FaceDescriptor>> {
        let row: Option<Option<Vec<u8>>> = self
            .conn
            .query_row(
                "SELECT descriptor FROM identities WHERE id = ?1",
                params![identity.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match row {
            None => Err(StoreError::UnknownIdentity(identity.clone())),
            Some(None) => Ok(None),
            Some(Some(blob)) => Ok(Some(descriptor_from_blob(&blob)?)),
        }
    }

    fn population(&self) -> Result<Vec<MatchCandidate>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, descriptor FROM identities WHERE descriptor IS NOT NULL ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut population = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            population.push(MatchCandidate {
                identity: Identity::new(id),
                descriptor: descriptor_from_blob(&blob)?,
            });
        }
        Ok(population)
    }

    fn display(&self, identity: &Identity) -> Result<Option<DisplayInfo>> {
        Ok(self
            .conn
            .query_row(
                "SELECT display_name, handle FROM identities WHERE id = ?1",
                params![identity.as_str()],
                |row| {
                    Ok(DisplayInfo {
                        display_name: row.get(0)?,
                        handle: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }
}

fn backend(err: StoreError) -> SourceError {
    match err {
        StoreError::UnknownIdentity(id) => SourceError::UnknownIdentity(id),
        other => SourceError::Backend(other.to_string()),
    }
}

impl DescriptorSource for SqliteStore {
    fn enrolled_descriptor(
        &self,
        identity: &Identity,
    ) -> std::result::Result<Option<FaceDescriptor>, SourceError> {
        self.canonical_descriptor(identity).map_err(backend)
    }

    fn list_population(&self) -> std::result::Result<Vec<MatchCandidate>, SourceError> {
        self.population().map_err(backend)
    }

    fn display_info(
        &self,
        identity: &Identity,
    ) -> std::result::Result<Option<DisplayInfo>, SourceError> {
        self.display(identity).map_err(backend)
    }
}

fn descriptor_to_blob(descriptor: &FaceDescriptor) -> Vec<u8> {
    descriptor
        .values()
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

fn descriptor_from_blob(blob: &[u8]) -> Result<FaceDescriptor> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::CorruptDescriptor(blob.len()));
    }
    Ok(FaceDescriptor::new(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    ))
}

fn fingerprint(blob: &[u8]) -> String {
    format!("{:x}", Sha256::digest(blob))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptTimestamp(format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::{MemberFailure, PlaceholderQuality};

    fn desc(values: &[f32]) -> FaceDescriptor {
        FaceDescriptor::new(values.to_vec())
    }

    #[test]
    fn test_first_enrollment_sets_canonical() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = store.register_identity("Alice", "alice@example.com").unwrap();
        assert_eq!(store.enrolled_descriptor(&alice).unwrap(), None);

        let first = store.enroll(&alice, &desc(&[0.1, 0.2])).unwrap();
        let second = store.enroll(&alice, &desc(&[0.3, 0.4])).unwrap();
        assert!(first.canonical_set);
        assert!(!second.canonical_set);
        assert_ne!(first.fingerprint, second.fingerprint);

        assert_eq!(store.enrolled_descriptor(&alice).unwrap(), Some(desc(&[0.1, 0.2])));
        let samples = store.samples(&alice).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].descriptor, desc(&[0.1, 0.2]));
        assert_eq!(samples[1].descriptor, desc(&[0.3, 0.4]));
        assert!(samples[0].captured_at <= samples[1].captured_at);
    }

    #[test]
    fn test_population_only_enrolled_in_registration_order() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.register_identity("A", "a").unwrap();
        let _password_only = store.register_identity("B", "b").unwrap();
        let c = store.register_identity("C", "c").unwrap();
        store.enroll(&c, &desc(&[1.0])).unwrap();
        store.enroll(&a, &desc(&[2.0])).unwrap();

        let ids: Vec<_> = store
            .list_population()
            .unwrap()
            .into_iter()
            .map(|m| m.identity)
            .collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn test_unknown_identity() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let ghost = Identity::new("ghost");
        assert!(matches!(
            store.enroll(&ghost, &desc(&[1.0])),
            Err(StoreError::UnknownIdentity(_))
        ));
        assert_eq!(
            store.enrolled_descriptor(&ghost).unwrap_err(),
            SourceError::UnknownIdentity(ghost.clone())
        );
        assert_eq!(store.display_info(&ghost).unwrap(), None);
    }

    #[test]
    fn test_duplicate_handle() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.register_identity("A", "same").unwrap();
        assert!(matches!(
            store.register_identity("B", "same"),
            Err(StoreError::DuplicateHandle(h)) if h == "same"
        ));
    }

    #[test]
    fn test_remove_cascades_samples() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.register_identity("A", "a").unwrap();
        store.enroll(&a, &desc(&[1.0, 2.0])).unwrap();
        assert!(store.remove_identity(&a).unwrap());
        assert!(!store.remove_identity(&a).unwrap());
        assert!(store.list_identities().unwrap().is_empty());
        let orphans: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM face_samples", [], |r| r.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_list_identities_summary() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.register_identity("A", "a").unwrap();
        store.register_identity("B", "b").unwrap();
        store.enroll(&a, &desc(&[1.0])).unwrap();
        store.enroll(&a, &desc(&[1.5])).unwrap();

        let list = store.list_identities().unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].enrolled);
        assert_eq!(list[0].samples, 2);
        assert!(!list[1].enrolled);
        assert_eq!(list[1].samples, 0);
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/faces.db");
        let alice;
        {
            let mut store = SqliteStore::open(&path).unwrap();
            alice = store.register_identity("Alice", "alice").unwrap();
            store.enroll(&alice, &desc(&[-0.5, 0.25, 1e-7])).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.enrolled_descriptor(&alice).unwrap(),
            Some(desc(&[-0.5, 0.25, 1e-7]))
        );
    }

    #[test]
    fn test_corrupt_blob() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.register_identity("A", "a").unwrap();
        store
            .conn
            .execute(
                "UPDATE identities SET descriptor = ?2 WHERE id = ?1",
                params![a.as_str(), vec![1u8, 2, 3]],
            )
            .unwrap();
        assert!(matches!(
            store.enrolled_descriptor(&a),
            Err(SourceError::Backend(_))
        ));
    }

    #[test]
    fn test_drives_matching_engine() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = store.register_identity("Alice", "alice").unwrap();
        let bob = store.register_identity("Bob", "bob").unwrap();
        let carol = store.register_identity("Carol", "carol").unwrap();
        store.enroll(&alice, &desc(&[0.0, 0.0])).unwrap();
        store.enroll(&bob, &desc(&[0.3, 0.4])).unwrap();

        let ranked = facegate_core::population::match_population(
            &store,
            &desc(&[0.3, 0.4]),
            0.75,
            &PlaceholderQuality,
        )
        .unwrap();
        assert_eq!(ranked.matches[0].identity, bob);
        assert_eq!(ranked.matches[0].display_name, "Bob");
        approx::assert_relative_eq!(ranked.matches[1].similarity, (-0.5f32).exp(), epsilon = 1e-6);

        let group = facegate_core::group::authenticate_group(
            &store,
            &[(alice, desc(&[0.0, 0.1])), (carol, desc(&[0.0, 0.0]))],
            Some(1),
            0.6,
        )
        .unwrap();
        assert!(group.group_authenticated);
        assert_eq!(group.members[1].error, Some(MemberFailure::NoEnrollment));
    }
}
