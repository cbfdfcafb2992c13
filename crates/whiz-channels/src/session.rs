//! Session blob export/import.
//!
//! A session is the SQLite store written by the WhatsApp client. It is shipped
//! to the user as `WHIZBOT_<base64(db)>` and written back before the bot
//! connects. When the store still has an un-checkpointed write-ahead log, the
//! log travels with it as a second segment: `WHIZBOT_<base64(db)>.<base64(wal)>`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::{info, warn};
use whiz_core::error::WhizError;

/// Prefix marking a whiz session blob.
pub const SESSION_PREFIX: &str = "WHIZBOT_";

/// File name of the session store inside a session directory.
pub const SESSION_DB_FILE: &str = "whatsapp.db";

const WAL_SUFFIX: &str = "-wal";
const SHM_SUFFIX: &str = "-shm";

/// Files making up a persisted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFiles {
    pub db: Vec<u8>,
    pub wal: Option<Vec<u8>>,
}

impl SessionFiles {
    /// Read the store (and its write-ahead log, if non-empty) from `session_dir`.
    pub fn read_from(session_dir: &Path) -> Result<Self, WhizError> {
        let db_path = session_dir.join(SESSION_DB_FILE);
        let db = std::fs::read(&db_path).map_err(|e| {
            WhizError::Link(format!("session store {} unreadable: {e}", db_path.display()))
        })?;
        let wal = std::fs::read(session_dir.join(format!("{SESSION_DB_FILE}{WAL_SUFFIX}")))
            .ok()
            .filter(|w| !w.is_empty());
        Ok(Self { db, wal })
    }
}

/// Encode session files as a shareable blob.
pub fn encode_session(files: &SessionFiles) -> String {
    let mut blob = format!("{SESSION_PREFIX}{}", STANDARD.encode(&files.db));
    if let Some(wal) = &files.wal {
        blob.push('.');
        blob.push_str(&STANDARD.encode(wal));
    }
    blob
}

/// Decode a blob produced by [`encode_session`].
///
/// Surrounding whitespace is ignored (blobs are usually pasted from chat).
pub fn decode_session(blob: &str) -> Result<SessionFiles, WhizError> {
    let trimmed = blob.trim();
    let payload = trimmed.strip_prefix(SESSION_PREFIX).ok_or_else(|| {
        WhizError::Config(format!("session id must start with {SESSION_PREFIX}"))
    })?;
    let (db_part, wal_part) = match payload.split_once('.') {
        Some((db, wal)) => (db, Some(wal)),
        None => (payload, None),
    };
    if db_part.is_empty() {
        return Err(WhizError::Config("session id is empty".into()));
    }
    let decode = |part: &str| {
        STANDARD
            .decode(part)
            .map_err(|e| WhizError::Config(format!("session id is not valid base64: {e}")))
    };
    Ok(SessionFiles {
        db: decode(db_part)?,
        wal: wal_part.map(decode).transpose()?,
    })
}

/// Write a session blob into `session_dir`, replacing any existing store.
///
/// SQLite side files from a previous session are removed so they cannot be
/// replayed over the imported database.
pub fn import_session(blob: &str, session_dir: &Path) -> Result<(), WhizError> {
    let files = decode_session(blob)?;
    std::fs::create_dir_all(session_dir)?;

    for suffix in [WAL_SUFFIX, SHM_SUFFIX] {
        let side = session_dir.join(format!("{SESSION_DB_FILE}{suffix}"));
        if side.exists() {
            if let Err(e) = std::fs::remove_file(&side) {
                warn!("failed to remove stale {}: {e}", side.display());
            }
        }
    }

    let db_path = session_dir.join(SESSION_DB_FILE);
    std::fs::write(&db_path, &files.db)?;
    if let Some(wal) = &files.wal {
        std::fs::write(session_dir.join(format!("{SESSION_DB_FILE}{WAL_SUFFIX}")), wal)?;
    }
    info!(
        "imported session ({} bytes) into {}",
        files.db.len(),
        db_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(db: &[u8], wal: Option<&[u8]>) -> SessionFiles {
        SessionFiles {
            db: db.to_vec(),
            wal: wal.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn test_encode_has_prefix() {
        let blob = encode_session(&files(b"SQLite format 3\0", None));
        assert!(blob.starts_with(SESSION_PREFIX));
        assert!(!blob.contains('.'));
        assert_eq!(decode_session(&blob).unwrap().db, b"SQLite format 3\0");
    }

    #[test]
    fn test_wal_segment_survives() {
        let original = files(b"db-bytes", Some(b"wal-bytes"));
        let blob = encode_session(&original);
        assert_eq!(blob.matches('.').count(), 1);
        assert_eq!(decode_session(&blob).unwrap(), original);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode_session("abc").is_err());
        assert!(decode_session("WHIZBOT_").is_err());
        assert!(decode_session("WHIZBOT_***").is_err());
        assert!(decode_session("WHIZBOT_AAAA.***").is_err());
    }

    #[test]
    fn test_decode_tolerates_whitespace() {
        let blob = format!("  {}\n", encode_session(&files(&[1, 2, 3], None)));
        assert_eq!(decode_session(&blob).unwrap().db, vec![1, 2, 3]);
    }

    #[test]
    fn test_import_overwrites_and_clears_side_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SESSION_DB_FILE), b"old").unwrap();
        std::fs::write(dir.path().join("whatsapp.db-wal"), b"stale-wal").unwrap();
        std::fs::write(dir.path().join("whatsapp.db-shm"), b"shm").unwrap();

        import_session(&encode_session(&files(b"new-session", None)), dir.path()).unwrap();

        assert_eq!(
            std::fs::read(dir.path().join(SESSION_DB_FILE)).unwrap(),
            b"new-session"
        );
        assert!(!dir.path().join("whatsapp.db-wal").exists());
        assert!(!dir.path().join("whatsapp.db-shm").exists());
    }

    #[test]
    fn test_read_then_import_roundtrip_through_disk() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join(SESSION_DB_FILE), b"db").unwrap();
        std::fs::write(src.path().join("whatsapp.db-wal"), b"wal").unwrap();
        let blob = encode_session(&SessionFiles::read_from(src.path()).unwrap());

        let dst = tempfile::tempdir().unwrap();
        let nested = dst.path().join("a/b");
        import_session(&blob, &nested).unwrap();
        assert_eq!(std::fs::read(nested.join(SESSION_DB_FILE)).unwrap(), b"db");
        assert_eq!(std::fs::read(nested.join("whatsapp.db-wal")).unwrap(), b"wal");
    }

    #[test]
    fn test_read_from_missing_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SessionFiles::read_from(dir.path()).is_err());
    }
}
