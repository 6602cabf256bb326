//! Audit journal of committed mutations
//!
//! Each entry is CBOR encoded and stored under the sha256 of its encoding, so
//! an entry's key doubles as its integrity check. A second key range indexes
//! entries by subject in insertion order.
use anyhow::Context;
use chrono::Utc;
use sled::{Batch, Db};
use std::path::Path;
use std::sync::Arc;

use crate::permission::{Actor, Role};
use crate::types::TimeStamp;
use crate::utils;

const ENTRY_PREFIX: &str = "e:";
const SUBJECT_PREFIX: &str = "s:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum SubjectKind {
    #[n(0)]
    Booking,
    #[n(1)]
    Kyc,
    #[n(2)]
    SubAdmin,
}

impl SubjectKind {
    fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Booking => "booking",
            SubjectKind::Kyc => "kyc",
            SubjectKind::SubAdmin => "subadmin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct JournalEntry {
    #[n(0)]
    pub entry_id: String, // bech32 uuid7
    #[n(1)]
    pub kind: SubjectKind,
    #[n(2)]
    pub subject_id: String,
    #[n(3)]
    pub actor_id: String,
    #[n(4)]
    pub actor_role: Role,
    #[n(5)]
    pub from: String,
    #[n(6)]
    pub to: String,
    #[n(7)]
    pub at: TimeStamp<Utc>,
    #[n(8)]
    pub message: String,
}

impl JournalEntry {
    pub fn new(
        kind: SubjectKind,
        subject_id: &str,
        actor: &Actor,
        from: &str,
        to: &str,
        message: &str,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            entry_id: utils::new_uuid_to_bech32("entry_")?,
            kind,
            subject_id: subject_id.to_string(),
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            from: from.to_string(),
            to: to.to_string(),
            at: TimeStamp::new(),
            message: message.to_string(),
        })
    }

    pub fn build(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

fn subject_prefix(kind: SubjectKind, subject_id: &str) -> String {
    format!("{SUBJECT_PREFIX}{}:{subject_id}/", kind.as_str())
}

#[derive(Clone)]
pub struct Journal {
    instance: Arc<Db>,
}

impl Journal {
    pub fn new(instance: Arc<Db>) -> Self {
        Self { instance }
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("failed to open journal at {}", path.display()))?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Stores the entry and indexes it under its subject. Returns the entry hash.
    pub fn record(&self, entry: &JournalEntry) -> anyhow::Result<String> {
        let (hash, cbor) = entry.build()?;
        let seq = self.instance.generate_id()?;

        let mut batch = Batch::default();
        batch.insert(format!("{ENTRY_PREFIX}{hash}").as_bytes(), cbor);
        // zero padded so lexical order is insertion order
        batch.insert(
            format!("{}{seq:020}", subject_prefix(entry.kind, &entry.subject_id)).as_bytes(),
            hash.as_bytes(),
        );
        self.instance.apply_batch(batch)?;

        Ok(hash)
    }

    pub fn get(&self, hash: &str) -> anyhow::Result<Option<JournalEntry>> {
        let Some(bytes) = self.instance.get(format!("{ENTRY_PREFIX}{hash}"))? else {
            return Ok(None);
        };
        if sha256::digest(&bytes.to_vec()) != hash {
            anyhow::bail!("journal entry {hash} does not match its content");
        }
        let entry: JournalEntry = minicbor::decode(&bytes)?;
        Ok(Some(entry))
    }

    /// Entries for one subject, oldest first.
    pub fn history(&self, kind: SubjectKind, subject_id: &str) -> anyhow::Result<Vec<JournalEntry>> {
        let mut entries = Vec::new();
        for item in self.instance.scan_prefix(subject_prefix(kind, subject_id)) {
            let (_, hash) = item?;
            let hash = String::from_utf8(hash.to_vec())?;
            let entry = self
                .get(&hash)?
                .with_context(|| format!("index points at missing entry {hash}"))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Journals a mutation the server already committed. Failures are logged and
/// swallowed: the remote change cannot be undone from here.
pub fn note_committed(
    journal: Option<&Journal>,
    kind: SubjectKind,
    subject_id: &str,
    actor: &Actor,
    from: &str,
    to: &str,
    message: &str,
) {
    let Some(journal) = journal else {
        return;
    };
    let recorded = JournalEntry::new(kind, subject_id, actor, from, to, message)
        .and_then(|entry| journal.record(&entry));
    if let Err(e) = recorded {
        tracing::warn!(
            subject = kind.as_str(),
            subject_id,
            error = %format!("{e:#}"),
            "failed to journal committed mutation"
        );
    }
}
