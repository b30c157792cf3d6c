use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lang {
    BnRom,
    En,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::BnRom => "bn-rom",
            Lang::En => "en",
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lang {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bn-rom" => Ok(Lang::BnRom),
            "en" => Ok(Lang::En),
            other => Err(StoreError::UnknownLang(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhraseEntry {
    pub src_lang: Lang,
    pub src_text: String,
    pub normalized_src: String,
    pub tgt_lang: Lang,
    pub tgt_text: String,
    pub pack: String,
    pub safety_level: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown language code: {0}")]
    UnknownLang(String),
    #[error("store io error: {0}")]
    Sql(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct PhraseStore {
    pool: SqlitePool,
    db_path: String,
}

impl PhraseStore {
    pub async fn connect(db_path: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(db_path)
            .unwrap_or_else(|_| SqliteConnectOptions::new().filename(db_path))
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        // An in-memory database only exists within a single connection, so
        // a pool would otherwise hand different callers disjoint databases.
        let max_connections = if db_path == ":memory:" { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            db_path: db_path.to_string(),
        })
    }

    /// Looks up a matching phrase. When `safety_max` is `None`, no cap is
    /// applied (pro path); `Some(n)` restricts to `safety_level <= n` (free
    /// path). Preference order on multiple matches: lowest safety_level,
    /// then pack="default" before others, then oldest created_at.
    pub async fn lookup(
        &self,
        src_lang: Lang,
        normalized_src: &str,
        tgt_lang: Lang,
        safety_max: Option<i32>,
        pack: Option<&str>,
    ) -> StoreResult<Option<PhraseEntry>> {
        let mut query = String::from(
            "SELECT src_lang, src_text, normalized_src, tgt_lang, tgt_text, pack, safety_level, created_at \
             FROM phrases WHERE src_lang = ? AND normalized_src = ? AND tgt_lang = ?",
        );
        if safety_max.is_some() {
            query.push_str(" AND safety_level <= ?");
        }
        if pack.is_some() {
            query.push_str(" AND pack = ?");
        }
        query.push_str(" ORDER BY safety_level ASC, (pack = 'default') DESC, created_at ASC LIMIT 1");

        let mut q = sqlx::query(&query)
            .bind(src_lang.as_str())
            .bind(normalized_src)
            .bind(tgt_lang.as_str());
        if let Some(max) = safety_max {
            q = q.bind(max);
        }
        if let Some(p) = pack {
            q = q.bind(p);
        }

        let row = q.fetch_optional(&self.pool).await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_entry(row)?))
    }

    /// Insert-or-update on the identity key. Conflict is treated as success:
    /// the row's target text is refreshed, matching the "conflict is
    /// success" discipline for fallback auto-inserts racing each other.
    pub async fn upsert(&self, entry: &PhraseEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO phrases (src_lang, src_text, normalized_src, tgt_lang, tgt_text, pack, safety_level, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (src_lang, normalized_src, tgt_lang, pack) \
             DO UPDATE SET tgt_text = excluded.tgt_text",
        )
        .bind(entry.src_lang.as_str())
        .bind(&entry.src_text)
        .bind(&entry.normalized_src)
        .bind(entry.tgt_lang.as_str())
        .bind(&entry.tgt_text)
        .bind(&entry.pack)
        .bind(entry.safety_level)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM phrases")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    pub async fn health_check(&self) -> StoreResult<(String, i64)> {
        let row_count = self.count().await?;
        Ok((self.db_path.clone(), row_count))
    }
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> StoreResult<PhraseEntry> {
    let src_lang: String = row.try_get("src_lang")?;
    let tgt_lang: String = row.try_get("tgt_lang")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(PhraseEntry {
        src_lang: src_lang.parse()?,
        src_text: row.try_get("src_text")?,
        normalized_src: row.try_get("normalized_src")?,
        tgt_lang: tgt_lang.parse()?,
        tgt_text: row.try_get("tgt_text")?,
        pack: row.try_get("pack")?,
        safety_level: row.try_get("safety_level")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_store() -> PhraseStore {
        PhraseStore::connect(":memory:").await.unwrap()
    }

    fn entry(normalized_src: &str, pack: &str, safety_level: i32) -> PhraseEntry {
        PhraseEntry {
            src_lang: Lang::BnRom,
            src_text: normalized_src.to_string(),
            normalized_src: normalized_src.to_string(),
            tgt_lang: Lang::En,
            tgt_text: "translated".to_string(),
            pack: pack.to_string(),
            safety_level,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_then_lookup_round_trips() {
        let store = fresh_store().await;
        store.upsert(&entry("rickshaw pabo na", "default", 1)).await.unwrap();

        let found = store
            .lookup(Lang::BnRom, "rickshaw pabo na", Lang::En, Some(1), None)
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().tgt_text, "translated");
    }

    #[tokio::test]
    async fn free_lookup_excludes_pro_only_rows() {
        let store = fresh_store().await;
        store.upsert(&entry("pocket khali", "auto", 2)).await.unwrap();

        let found = store
            .lookup(Lang::BnRom, "pocket khali", Lang::En, Some(1), None)
            .await
            .unwrap();
        assert!(found.is_none());

        let found_pro = store
            .lookup(Lang::BnRom, "pocket khali", Lang::En, None, None)
            .await
            .unwrap();
        assert!(found_pro.is_some());
    }

    #[tokio::test]
    async fn upsert_on_identity_conflict_updates_in_place() {
        let store = fresh_store().await;
        let mut e = entry("rickshaw pabo na", "default", 1);
        store.upsert(&e).await.unwrap();
        e.tgt_text = "updated translation".to_string();
        store.upsert(&e).await.unwrap();

        let found = store
            .lookup(Lang::BnRom, "rickshaw pabo na", Lang::En, Some(1), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.tgt_text, "updated translation");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn prefers_default_pack_over_others_at_same_safety_level() {
        let store = fresh_store().await;
        store.upsert(&entry("ki obostha", "slang", 0)).await.unwrap();
        store.upsert(&entry("ki obostha", "default", 0)).await.unwrap();

        let found = store
            .lookup(Lang::BnRom, "ki obostha", Lang::En, Some(1), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.pack, "default");
    }
}
