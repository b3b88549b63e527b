/// Schema of the tracker database
///
/// Entity invariants are enforced by the database itself: one channel per
/// name, one evaluation per (channel, revision), `error` present iff an
/// evaluation FAILED and `result` present iff it COMPLETED.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS channels (
    name        TEXT PRIMARY KEY,
    status      TEXT NOT NULL CHECK (status IN ('rolling', 'stable', 'deprecated', 'unmaintained')),
    variant     TEXT,
    revision    TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS evaluations (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    channel       TEXT NOT NULL REFERENCES channels(name),
    revision      TEXT NOT NULL,
    state         TEXT NOT NULL CHECK (state IN ('PENDING', 'RUNNING', 'COMPLETED', 'FAILED')),
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    completed_at  TEXT,
    error         TEXT,
    result        TEXT,
    UNIQUE (channel, revision),
    CHECK ((state = 'FAILED') = (error IS NOT NULL)),
    CHECK ((state = 'COMPLETED') = (result IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_evaluations_state ON evaluations(state, id);
CREATE INDEX IF NOT EXISTS idx_evaluations_channel ON evaluations(channel, state, id);

CREATE TABLE IF NOT EXISTS cve_records (
    cve_id         TEXT PRIMARY KEY,
    published      TEXT,
    last_modified  TEXT NOT NULL,
    title          TEXT,
    description    TEXT NOT NULL,
    severity       TEXT NOT NULL,
    score          REAL,
    affected       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS suggestions (
    cve_id       TEXT NOT NULL,
    channel      TEXT NOT NULL,
    package      TEXT NOT NULL,
    match_basis  INTEGER NOT NULL,
    status       TEXT NOT NULL,
    payload      TEXT NOT NULL,
    computed_at  TEXT NOT NULL,
    PRIMARY KEY (cve_id, channel, package)
);

CREATE INDEX IF NOT EXISTS idx_suggestions_channel ON suggestions(channel);

CREATE TABLE IF NOT EXISTS checkpoints (
    name   TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS change_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    payload       TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    delivered_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_change_events_pending ON change_events(delivered_at, id);
"#;
