//! SQLite-backed semantic memory.
//!
//! Persists arbitrary records as `(id, text, metadata, embedding)` rows and
//! supports free-text recall via cosine similarity over a local, hashed
//! embedding — there is no ML model involved, and none is required at the
//! scale this reference adapter targets (single-process, per-agent memory).
//!
//! # Storage layout
//!
//! A single table `semantic_memories` is created (if it does not already
//! exist):
//!
//! | column    | type | description                               |
//! |-----------|------|-------------------------------------------|
//! | id        | TEXT | UUID v4 primary key                        |
//! | text      | TEXT | The text the record was indexed under      |
//! | metadata  | TEXT | JSON-encoded caller metadata               |
//! | embedding | BLOB | Little-endian f32 hashed embedding         |
//!
//! # Example
//!
//! ```rust
//! use arena_memory::semantic::{SemanticCallbacks, SqliteSemanticStore};
//! use arena_types::{ObjectStatus, ObjectType, WorldObject};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let callbacks = SemanticCallbacks {
//!         to_text: |obj: &WorldObject| format!("{:?} {} at {:?}", obj.object_type, obj.subtype, obj.position),
//!         to_metadata: |obj: &WorldObject| serde_json::to_value(obj).unwrap(),
//!         from_dict: |v: &serde_json::Value| serde_json::from_value(v.clone()).ok(),
//!     };
//!     let store = SqliteSemanticStore::open_in_memory(callbacks).unwrap();
//!
//!     let berry = WorldObject {
//!         name: "berry_1".to_string(),
//!         object_type: ObjectType::Resource,
//!         subtype: "berry".to_string(),
//!         position: [1.0, 0.0, 0.0],
//!         last_seen_tick: 0,
//!         status: ObjectStatus::Active,
//!         damage: 0.0,
//!         metadata: serde_json::Map::new(),
//!     };
//!     store.store(&berry).await.unwrap();
//!
//!     let hits = store.query("berry", 5, 0.0).await.unwrap();
//!     assert_eq!(hits[0].metadata["name"], "berry_1");
//! }
//! ```

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, params};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can arise from semantic memory operations.
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("blocking task panicked: {0}")]
    TaskPanic(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One hit from [`SqliteSemanticStore::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub id: String,
    pub text: String,
    pub metadata: Value,
    pub score: f32,
    pub distance: f32,
}

/// The three callbacks a caller supplies to adapt `T` to the text-indexed store.
pub struct SemanticCallbacks<T> {
    pub to_text: fn(&T) -> String,
    pub to_metadata: fn(&T) -> Value,
    pub from_dict: fn(&Value) -> Option<T>,
}

/// Fixed embedding width for the local hashed bag-of-trigrams embedding.
const EMBEDDING_DIM: usize = 128;

/// Deterministic local text embedding: hashes character trigrams into a
/// fixed-width vector and L2-normalizes it. Not a learned embedding — a
/// stand-in sufficient for approximate lexical similarity at this scale.
fn embed_text(text: &str) -> Vec<f32> {
    let normalized: String = text.to_lowercase();
    let chars: Vec<char> = normalized.chars().collect();
    let mut vector = vec![0.0f32; EMBEDDING_DIM];

    if chars.len() < 3 {
        for c in &chars {
            let bucket = (*c as usize) % EMBEDDING_DIM;
            vector[bucket] += 1.0;
        }
    } else {
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let hash = fnv1a(trigram.as_bytes());
            vector[(hash as usize) % EMBEDDING_DIM] += 1.0;
        }
    }

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    vector
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot.clamp(-1.0, 1.0)
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// SQLite-backed semantic memory store, generic over the record type `T`.
pub struct SqliteSemanticStore<T> {
    conn: Arc<Mutex<Connection>>,
    callbacks: SemanticCallbacks<T>,
}

impl<T: Send + 'static> SqliteSemanticStore<T> {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str, callbacks: SemanticCallbacks<T>) -> Result<Self, SemanticError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            callbacks,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (tests, ephemeral per-episode memory).
    pub fn open_in_memory(callbacks: SemanticCallbacks<T>) -> Result<Self, SemanticError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            callbacks,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), SemanticError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS semantic_memories (
                id        TEXT NOT NULL PRIMARY KEY,
                text      TEXT NOT NULL,
                metadata  TEXT NOT NULL,
                embedding BLOB NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Store (or refresh) the record, keyed by a freshly generated id.
    pub async fn store(&self, obj: &T) -> Result<(), SemanticError> {
        let text = (self.callbacks.to_text)(obj);
        let metadata = (self.callbacks.to_metadata)(obj);
        let embedding = embed_text(&text);

        let conn = Arc::clone(&self.conn);
        let id = Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(&metadata)?;
        let blob = embedding_to_bytes(&embedding);

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            conn.execute(
                "INSERT INTO semantic_memories (id, text, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, text, metadata_json, blob],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(|e| SemanticError::TaskPanic(e.to_string()))??;
        Ok(())
    }

    async fn scored_rows(&self, text: &str, k: usize, threshold: f64) -> Result<Vec<SemanticHit>, SemanticError> {
        let query_embedding = embed_text(text);
        let conn = Arc::clone(&self.conn);

        let mut rows = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let mut stmt = conn.prepare("SELECT id, text, metadata, embedding FROM semantic_memories")?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let text: String = row.get(1)?;
                let metadata: String = row.get(2)?;
                let embedding: Vec<u8> = row.get(3)?;
                Ok((id, text, metadata, embedding))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, rusqlite::Error>(out)
        })
        .await
        .map_err(|e| SemanticError::TaskPanic(e.to_string()))??;

        let mut hits: Vec<SemanticHit> = Vec::with_capacity(rows.len());
        for (id, row_text, metadata_json, blob) in rows.drain(..) {
            let embedding = bytes_to_embedding(&blob);
            let score = cosine_similarity(&query_embedding, &embedding);
            if (score as f64) < threshold {
                continue;
            }
            let metadata: Value = serde_json::from_str(&metadata_json)?;
            hits.push(SemanticHit {
                id,
                text: row_text,
                metadata,
                score,
                distance: 1.0 - score,
            });
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    /// Top-`k` hits for `text` scoring at least `threshold`, highest similarity first.
    pub async fn query(&self, text: &str, k: usize, threshold: f64) -> Result<Vec<SemanticHit>, SemanticError> {
        self.scored_rows(text, k, threshold).await
    }

    /// Like [`Self::query`] but reconstructs `T` from each hit's metadata via `from_dict`.
    pub async fn query_objects(&self, text: &str, k: usize, threshold: f64) -> Result<Vec<T>, SemanticError> {
        let hits = self.scored_rows(text, k, threshold).await?;
        Ok(hits
            .iter()
            .filter_map(|hit| (self.callbacks.from_dict)(&hit.metadata))
            .collect())
    }

    /// Every stored record's raw metadata, insertion order.
    pub async fn get_all_memories(&self) -> Result<Vec<Value>, SemanticError> {
        let conn = Arc::clone(&self.conn);
        let rows = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let mut stmt = conn.prepare("SELECT metadata FROM semantic_memories ORDER BY rowid ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, rusqlite::Error>(out)
        })
        .await
        .map_err(|e| SemanticError::TaskPanic(e.to_string()))??;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(SemanticError::from))
            .collect()
    }

    pub async fn clear(&self) -> Result<(), SemanticError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            conn.execute("DELETE FROM semantic_memories", [])?;
            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(|e| SemanticError::TaskPanic(e.to_string()))??;
        Ok(())
    }

    /// Export every record's metadata as JSON lines to `path`.
    pub async fn save(&self, path: &str) -> Result<(), SemanticError> {
        let memories = self.get_all_memories().await?;
        let path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), SemanticError> {
            use std::io::Write;
            let mut file = std::fs::File::create(path)?;
            for memory in memories {
                writeln!(file, "{}", serde_json::to_string(&memory)?)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| SemanticError::TaskPanic(e.to_string()))??;
        Ok(())
    }

    /// Import records previously written by [`Self::save`], re-embedding each via `to_text`.
    pub async fn load(&self, path: &str) -> Result<(), SemanticError> {
        let path = path.to_string();
        let contents = tokio::task::spawn_blocking(move || std::fs::read_to_string(path))
            .await
            .map_err(|e| SemanticError::TaskPanic(e.to_string()))??;

        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let metadata: Value = serde_json::from_str(line)?;
            if let Some(obj) = (self.callbacks.from_dict)(&metadata) {
                self.store(&obj).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_types::{ObjectStatus, ObjectType, WorldObject};

    fn callbacks() -> SemanticCallbacks<WorldObject> {
        SemanticCallbacks {
            to_text: |obj| format!("{:?} {} near {:?}", obj.object_type, obj.subtype, obj.position),
            to_metadata: |obj| serde_json::to_value(obj).unwrap(),
            from_dict: |v| serde_json::from_value(v.clone()).ok(),
        }
    }

    fn berry(name: &str) -> WorldObject {
        WorldObject {
            name: name.to_string(),
            object_type: ObjectType::Resource,
            subtype: "berry".to_string(),
            position: [1.0, 0.0, 0.0],
            last_seen_tick: 0,
            status: ObjectStatus::Active,
            damage: 0.0,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn store_and_query_round_trips() {
        let store = SqliteSemanticStore::open_in_memory(callbacks()).unwrap();
        store.store(&berry("berry_1")).await.unwrap();

        let hits = store.query("berry", 5, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata["name"], "berry_1");
    }

    #[tokio::test]
    async fn query_objects_reconstructs_via_from_dict() {
        let store = SqliteSemanticStore::open_in_memory(callbacks()).unwrap();
        store.store(&berry("berry_1")).await.unwrap();

        let objs = store.query_objects("berry", 5, 0.0).await.unwrap();
        assert_eq!(objs[0].name, "berry_1");
    }

    #[tokio::test]
    async fn threshold_excludes_dissimilar_text() {
        let store = SqliteSemanticStore::open_in_memory(callbacks()).unwrap();
        store.store(&berry("berry_1")).await.unwrap();

        let hits = store.query("zzz completely unrelated", 5, 0.9).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let store = SqliteSemanticStore::open_in_memory(callbacks()).unwrap();
        store.store(&berry("berry_1")).await.unwrap();
        store.clear().await.unwrap();

        assert!(store.get_all_memories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip_through_a_file() {
        let store = SqliteSemanticStore::open_in_memory(callbacks()).unwrap();
        store.store(&berry("berry_1")).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.jsonl");
        store.save(path.to_str().unwrap()).await.unwrap();

        let reloaded = SqliteSemanticStore::open_in_memory(callbacks()).unwrap();
        reloaded.load(path.to_str().unwrap()).await.unwrap();

        let objs = reloaded.query_objects("berry", 5, 0.0).await.unwrap();
        assert_eq!(objs[0].name, "berry_1");
    }
}
