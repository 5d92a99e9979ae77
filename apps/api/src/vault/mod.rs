//! Document Vault: supplies résumé content to the engine as flattened plain text.
//!
//! The engine is agnostic to storage; it only ever sees the output of `flatten_sections`.
//! `PgDocumentVault` reads from Postgres:
//!
//! ```sql
//! CREATE TABLE resume_sections (
//!     resume_id    UUID NOT NULL,
//!     section_type TEXT NOT NULL,
//!     content      TEXT NOT NULL,
//!     position     INT  NOT NULL
//! );
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;

/// Canonical section order of the flattened text. Unknown types follow, by name.
const SECTION_ORDER: [&str; 4] = ["experience", "skills", "education", "certifications"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ResumeSection {
    pub section_type: String,
    pub content: String,
    pub position: i32,
}

#[async_trait]
pub trait DocumentVault: Send + Sync {
    async fn resume_sections(&self, resume_id: Uuid) -> Result<Vec<ResumeSection>, AppError>;
}

/// Loads and flattens a stored résumé. A résumé with no sections does not exist.
pub async fn load_resume_text(vault: &dyn DocumentVault, resume_id: Uuid) -> Result<String, AppError> {
    let sections = vault.resume_sections(resume_id).await?;
    if sections.is_empty() {
        return Err(AppError::NotFound(format!("Resume {resume_id} not found")));
    }
    debug!("Loaded {} sections for resume {}", sections.len(), resume_id);
    Ok(flatten_sections(&sections))
}

/// Picks the résumé text for a request: inline text wins, otherwise the vault is consulted.
pub async fn resolve_resume_text(
    vault: Option<&dyn DocumentVault>,
    resume_text: Option<String>,
    resume_id: Option<Uuid>,
) -> Result<String, AppError> {
    match (resume_text, resume_id) {
        (Some(text), _) => Ok(text),
        (None, Some(id)) => match vault {
            Some(vault) => load_resume_text(vault, id).await,
            None => Err(AppError::Validation(
                "resume_id was given but no document vault is configured".to_string(),
            )),
        },
        (None, None) => Err(AppError::Validation(
            "either resume_text or resume_id is required".to_string(),
        )),
    }
}

/// Renders sections as headed plain-text blocks in canonical order, preserving the stored
/// position within each section type.
pub fn flatten_sections(sections: &[ResumeSection]) -> String {
    let mut ordered: Vec<&ResumeSection> = sections
        .iter()
        .filter(|s| !s.content.trim().is_empty())
        .collect();
    ordered.sort_by(|a, b| {
        section_rank(&a.section_type)
            .cmp(&section_rank(&b.section_type))
            .then(a.position.cmp(&b.position))
    });

    let mut blocks: Vec<(String, Vec<&str>)> = Vec::new();
    for section in ordered {
        let key = section.section_type.trim().to_lowercase();
        match blocks.last_mut() {
            Some((current, lines)) if *current == key => lines.push(section.content.trim()),
            _ => blocks.push((key, vec![section.content.trim()])),
        }
    }

    blocks
        .into_iter()
        .map(|(key, lines)| format!("{}\n{}", heading(&key), lines.join("\n")))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn section_rank(section_type: &str) -> (usize, String) {
    let key = section_type.trim().to_lowercase();
    let rank = SECTION_ORDER
        .iter()
        .position(|s| *s == key)
        .unwrap_or(SECTION_ORDER.len());
    (rank, key)
}

fn heading(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Backends
// ────────────────────────────────────────────────────────────────────────────

const MAX_CONNECTIONS: u32 = 5;

pub struct PgDocumentVault {
    pool: PgPool,
}

impl PgDocumentVault {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens the connection pool backing the vault.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL document vault...");
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;
        info!("PostgreSQL connection pool established");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DocumentVault for PgDocumentVault {
    async fn resume_sections(&self, resume_id: Uuid) -> Result<Vec<ResumeSection>, AppError> {
        Ok(sqlx::query_as::<_, ResumeSection>(
            r#"
            SELECT section_type, content, position
            FROM resume_sections
            WHERE resume_id = $1
            ORDER BY position
            "#,
        )
        .bind(resume_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

/// Process-local vault for tests and vault-less deployments.
#[derive(Default)]
pub struct InMemoryVault {
    resumes: RwLock<HashMap<Uuid, Vec<ResumeSection>>>,
}

impl InMemoryVault {
    pub async fn insert(&self, resume_id: Uuid, sections: Vec<ResumeSection>) {
        self.resumes.write().await.insert(resume_id, sections);
    }
}

#[async_trait]
impl DocumentVault for InMemoryVault {
    async fn resume_sections(&self, resume_id: Uuid) -> Result<Vec<ResumeSection>, AppError> {
        Ok(self
            .resumes
            .read()
            .await
            .get(&resume_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(section_type: &str, content: &str, position: i32) -> ResumeSection {
        ResumeSection {
            section_type: section_type.to_string(),
            content: content.to_string(),
            position,
        }
    }

    #[test]
    fn test_flatten_uses_canonical_order() {
        let sections = vec![
            section("education", "BSc Computer Science", 0),
            section("volunteering", "Mentor at Rust meetup", 0),
            section("skills", "Rust, Kafka", 0),
            section("experience", "Backend engineer at Acme", 1),
            section("Experience", "Intern at Initech", 0),
            section("certifications", "CKA", 0),
        ];
        let text = flatten_sections(&sections);
        assert_eq!(
            text,
            "Experience\nIntern at Initech\nBackend engineer at Acme\n\n\
             Skills\nRust, Kafka\n\n\
             Education\nBSc Computer Science\n\n\
             Certifications\nCKA\n\n\
             Volunteering\nMentor at Rust meetup"
        );
    }

    #[test]
    fn test_flatten_skips_blank_sections() {
        let sections = vec![section("skills", "  ", 0), section("experience", "Acme", 0)];
        assert_eq!(flatten_sections(&sections), "Experience\nAcme");
    }

    #[tokio::test]
    async fn test_missing_resume_is_not_found() {
        let vault = InMemoryVault::default();
        let err = load_resume_text(&vault, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_prefers_inline_text() {
        let vault = InMemoryVault::default();
        let id = Uuid::new_v4();
        vault.insert(id, vec![section("skills", "Rust", 0)]).await;

        let inline = resolve_resume_text(Some(&vault), Some("skills: Go".to_string()), Some(id))
            .await
            .unwrap();
        assert_eq!(inline, "skills: Go");

        let stored = resolve_resume_text(Some(&vault), None, Some(id)).await.unwrap();
        assert_eq!(stored, "Skills\nRust");
    }

    #[tokio::test]
    async fn test_resolve_without_vault_or_text_is_invalid() {
        let err = resolve_resume_text(None, None, Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = resolve_resume_text(None, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
