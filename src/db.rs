use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::enrich::JelTable;
use crate::errors::IngestResult;
use crate::paper::PaperEntry;

pub fn connect(path: &Path) -> IngestResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> IngestResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS listings (
            url        TEXT PRIMARY KEY,
            status     INTEGER NOT NULL DEFAULT 1,
            error      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_listings_status ON listings(status);

        -- Reference table, seeded externally. Top-level categories have no parent.
        CREATE TABLE IF NOT EXISTS jel (
            code        TEXT PRIMARY KEY,
            parent      TEXT REFERENCES jel(code),
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS papers (
            id         INTEGER PRIMARY KEY,
            url        TEXT NOT NULL,
            handle     TEXT NOT NULL UNIQUE COLLATE NOCASE,
            template   TEXT,
            title      TEXT,
            abstract   TEXT,
            journal    TEXT,
            volume     TEXT,
            issue      TEXT,
            pages      TEXT,
            year       INTEGER CHECK(year BETWEEN 1 AND 9999),
            language   TEXT CHECK(length(language) = 2),
            redif      BLOB
        );
        CREATE INDEX IF NOT EXISTS idx_papers_url ON papers(url);

        CREATE TABLE IF NOT EXISTS authors (
            id         INTEGER PRIMARY KEY,
            paper_id   INTEGER NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
            name       TEXT NOT NULL,
            email      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_authors_paper ON authors(paper_id);

        CREATE TABLE IF NOT EXISTS papers_jel (
            paper_id   INTEGER NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
            code       TEXT NOT NULL REFERENCES jel(code),
            PRIMARY KEY (paper_id, code)
        );
        CREATE INDEX IF NOT EXISTS idx_papers_jel_code ON papers_jel(code);
        ",
    )?;
    Ok(())
}

// ── Listings ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ListingStatus {
    Ok,
    Pending,
    Error,
}

impl ListingStatus {
    pub fn code(self) -> i64 {
        match self {
            ListingStatus::Ok => 0,
            ListingStatus::Pending => 1,
            ListingStatus::Error => 2,
        }
    }
}

pub fn insert_listings(conn: &Connection, urls: &[String]) -> IngestResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO listings (url) VALUES (?1)")?;
        for url in urls {
            count += stmt.execute([url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_listings(conn: &Connection, status: ListingStatus) -> IngestResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT url FROM listings WHERE status = ?1")?;
    let rows = stmt
        .query_map([status.code()], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_ok(conn: &Connection, url: &str) -> IngestResult<()> {
    conn.prepare_cached("UPDATE listings SET status = ?1, error = NULL WHERE url = ?2")?
        .execute(params![ListingStatus::Ok.code(), url])?;
    Ok(())
}

pub fn mark_error(conn: &Connection, url: &str, error: &str) -> IngestResult<()> {
    conn.prepare_cached("UPDATE listings SET status = ?1, error = ?2 WHERE url = ?3")?
        .execute(params![ListingStatus::Error.code(), error, url])?;
    Ok(())
}

// ── JEL ──

/// Official codes: everything below the top-level categories.
pub fn fetch_jel_codes(conn: &Connection) -> IngestResult<JelTable> {
    let mut stmt = conn.prepare("SELECT code FROM jel WHERE parent IS NOT NULL")?;
    let codes = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JelTable::new(codes))
}

/// Load reference codes as `(code, parent, description)`; parents must come first.
pub fn insert_jel(
    conn: &Connection,
    codes: &[(String, Option<String>, Option<String>)],
) -> IngestResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO jel (code, parent, description) VALUES (?1, ?2, ?3)
             ON CONFLICT(code) DO UPDATE
             SET parent = excluded.parent, description = excluded.description",
        )?;
        for (code, parent, description) in codes {
            count += stmt.execute(params![code, parent, description])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Papers ──

/// Replace a paper and all of its child rows. Returns the new paper id.
pub fn replace_paper(conn: &Connection, p: &PaperEntry) -> IngestResult<i64> {
    let previous: Option<i64> = conn
        .prepare_cached("SELECT id FROM papers WHERE handle = ?1")?
        .query_row([&p.handle], |row| row.get(0))
        .optional()?;
    if let Some(id) = previous {
        conn.prepare_cached("DELETE FROM authors WHERE paper_id = ?1")?
            .execute([id])?;
        conn.prepare_cached("DELETE FROM papers_jel WHERE paper_id = ?1")?
            .execute([id])?;
        conn.prepare_cached("DELETE FROM papers WHERE id = ?1")?
            .execute([id])?;
    }

    conn.prepare_cached(
        "INSERT INTO papers
         (url, handle, template, title, abstract, journal, volume, issue, pages,
          year, language, redif)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?
    .execute(params![
        p.url, p.handle, p.template, p.title, p.abstract_text, p.journal, p.volume,
        p.issue, p.pages, p.year, p.language, p.redif,
    ])?;
    let id = conn.last_insert_rowid();

    let mut a_stmt =
        conn.prepare_cached("INSERT INTO authors (paper_id, name, email) VALUES (?1, ?2, ?3)")?;
    for a in &p.authors {
        a_stmt.execute(params![id, a.name, a.email])?;
    }

    let mut j_stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO papers_jel (paper_id, code) VALUES (?1, ?2)")?;
    for code in &p.jel {
        j_stmt.execute(params![id, code])?;
    }
    Ok(id)
}

pub struct StoredPaper {
    pub url: String,
    pub redif: Vec<u8>,
}

/// Stored templates, for rebuilding papers without fetching.
pub fn fetch_stored_papers(
    conn: &Connection,
    limit: Option<usize>,
) -> IngestResult<Vec<StoredPaper>> {
    let sql = format!(
        "SELECT url, redif FROM papers WHERE redif IS NOT NULL ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredPaper {
                url: row.get(0)?,
                redif: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Stored template blob of one paper; handles match case-insensitively.
pub fn fetch_stored_template(conn: &Connection, handle: &str) -> IngestResult<Option<Vec<u8>>> {
    let blob = conn
        .query_row(
            "SELECT redif FROM papers WHERE handle = ?1",
            [handle],
            |row| row.get(0),
        )
        .optional()?;
    Ok(blob)
}

// ── Stats ──

pub struct Stats {
    pub listings: usize,
    pub ok: usize,
    pub pending: usize,
    pub errors: usize,
    pub papers: usize,
    pub authors: usize,
    pub jel_links: usize,
}

pub fn get_stats(conn: &Connection) -> IngestResult<Stats> {
    let count =
        |sql: &str| -> IngestResult<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let by_status = |status: ListingStatus| -> IngestResult<usize> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM listings WHERE status = ?1",
            [status.code()],
            |r| r.get(0),
        )?)
    };
    Ok(Stats {
        listings: count("SELECT COUNT(*) FROM listings")?,
        ok: by_status(ListingStatus::Ok)?,
        pending: by_status(ListingStatus::Pending)?,
        errors: by_status(ListingStatus::Error)?,
        papers: count("SELECT COUNT(*) FROM papers")?,
        authors: count("SELECT COUNT(*) FROM authors")?,
        jel_links: count("SELECT COUNT(*) FROM papers_jel")?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// In-memory database with the schema and a few JEL codes.
    pub fn memory_db(jel: &[(&str, Option<&str>)]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        for (code, parent) in jel {
            conn.execute(
                "INSERT INTO jel (code, parent) VALUES (?1, ?2)",
                params![code, parent],
            )
            .unwrap();
        }
        conn
    }

    pub fn listing(conn: &Connection, url: &str) -> (i64, Option<String>) {
        conn.query_row(
            "SELECT status, error FROM listings WHERE url = ?1",
            [url],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap()
    }
}
