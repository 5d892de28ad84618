//! Table layout.
//!
//! Sibling uniqueness of `(page_id, parent_id, position)` is deliberately not
//! a unique index: a reorder passes through states where two siblings briefly
//! share a position. The position editor verifies it before commit instead.

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    path TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    route_name TEXT UNIQUE,
    slug TEXT UNIQUE,
    template_id INTEGER REFERENCES templates(id),
    enabled INTEGER NOT NULL DEFAULT 1,
    login_required INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    parent_id INTEGER REFERENCES blocks(id),
    position INTEGER NOT NULL,
    type TEXT NOT NULL,
    name TEXT,
    settings TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS blocks_page_position ON blocks(page_id, position);
CREATE INDEX IF NOT EXISTS blocks_parent ON blocks(parent_id);
";
