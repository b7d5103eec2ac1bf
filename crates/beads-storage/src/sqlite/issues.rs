//! Issue CRUD operations for [`SqliteStore`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use beads_core::entity::BondRef;
use beads_core::enums::{EventType, IssueType, Status};
use beads_core::filter::IssueFilter;
use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::store::SqliteStore;
use crate::traits::{Event, IssueUpdates};

// ---------------------------------------------------------------------------
// Column list (shared between INSERT and SELECT)
// ---------------------------------------------------------------------------

/// All issue columns in a deterministic order for SELECT queries.
pub(crate) const ISSUE_COLUMNS: &str = r#"
    id, title, description, design, acceptance_criteria, notes,
    status, priority, issue_type, assignee,
    created_at, created_by, updated_at,
    closed_at, close_reason, closed_by,
    defer_until, ephemeral, pinned, await_type,
    external_ref, source_system, bonded_from, metadata
"#;

/// Same as [`ISSUE_COLUMNS`] but prefixed with `issues.` for JOIN queries
/// where column names would otherwise be ambiguous.
pub(crate) const ISSUE_COLUMNS_PREFIXED: &str = r#"
    issues.id, issues.title, issues.description, issues.design, issues.acceptance_criteria, issues.notes,
    issues.status, issues.priority, issues.issue_type, issues.assignee,
    issues.created_at, issues.created_by, issues.updated_at,
    issues.closed_at, issues.close_reason, issues.closed_by,
    issues.defer_until, issues.ephemeral, issues.pinned, issues.await_type,
    issues.external_ref, issues.source_system, issues.bonded_from, issues.metadata
"#;

// ---------------------------------------------------------------------------
// Row scanning
// ---------------------------------------------------------------------------

/// Deserialises a row into an [`Issue`].
///
/// The column order MUST match [`ISSUE_COLUMNS`].
pub(crate) fn scan_issue(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let status_str: String = row.get("status")?;
    let issue_type_str: String = row.get("issue_type")?;

    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;
    let closed_at_str: Option<String> = row.get("closed_at")?;
    let defer_until_str: Option<String> = row.get("defer_until")?;

    let ephemeral_int: i32 = row.get("ephemeral")?;
    let pinned_int: i32 = row.get("pinned")?;

    let bonded_from_str: String = row.get("bonded_from")?;
    let metadata_str: String = row.get("metadata")?;

    let bonded_from: Vec<BondRef> = serde_json::from_str(&bonded_from_str).unwrap_or_default();
    let metadata = if metadata_str.is_empty() || metadata_str == "{}" {
        None
    } else {
        serde_json::value::RawValue::from_string(metadata_str).ok()
    };

    Ok(Issue {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        design: row.get("design")?,
        acceptance_criteria: row.get("acceptance_criteria")?,
        notes: row.get("notes")?,
        status: Status::from(status_str),
        priority: row.get("priority")?,
        issue_type: IssueType::from(issue_type_str),
        assignee: row.get("assignee")?,
        created_at: parse_datetime(&created_at_str),
        created_by: row.get("created_by")?,
        updated_at: parse_datetime(&updated_at_str),
        closed_at: closed_at_str.as_deref().map(parse_datetime),
        close_reason: row.get("close_reason")?,
        closed_by: row.get("closed_by")?,
        defer_until: defer_until_str.as_deref().map(parse_datetime),
        ephemeral: ephemeral_int != 0,
        pinned: pinned_int != 0,
        await_type: row.get("await_type")?,
        external_ref: row.get("external_ref")?,
        source_system: row.get("source_system")?,
        bonded_from,
        metadata,
        // Populated by the caller when needed.
        labels: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Datetime helpers
// ---------------------------------------------------------------------------

/// Formats a `DateTime<Utc>` as ISO 8601 TEXT for SQLite.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses an ISO 8601 TEXT string from SQLite into a `DateTime<Utc>`.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>().unwrap_or_else(|_| {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ"))
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .map(|ndt| ndt.and_utc())
            .unwrap_or_else(|_| Utc::now())
    })
}

// ---------------------------------------------------------------------------
// Connection-level helpers (shared between store and transaction)
// ---------------------------------------------------------------------------

/// Inserts a single issue on the given connection.
pub(crate) fn insert_issue(conn: &Connection, issue: &Issue, actor: &str) -> Result<()> {
    let now = Utc::now();
    let now_str = format_datetime(&now);

    let bonded_from_str =
        serde_json::to_string(&issue.bonded_from).unwrap_or_else(|_| "[]".to_string());
    let metadata_str = issue
        .metadata
        .as_ref()
        .map(|m| m.get().to_string())
        .unwrap_or_else(|| "{}".to_string());

    conn.execute(
        &format!(
            "INSERT INTO issues ({ISSUE_COLUMNS}) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12, ?13,
                ?14, ?15, ?16,
                ?17, ?18, ?19, ?20,
                ?21, ?22, ?23, ?24
            )"
        ),
        params![
            issue.id,                                         // 1
            issue.title,                                      // 2
            issue.description,                                // 3
            issue.design,                                     // 4
            issue.acceptance_criteria,                        // 5
            issue.notes,                                      // 6
            issue.status.as_str(),                            // 7
            issue.priority,                                   // 8
            issue.issue_type.as_str(),                        // 9
            issue.assignee,                                   // 10
            format_datetime(&issue.created_at),               // 11
            issue.created_by,                                 // 12
            format_datetime(&issue.updated_at),               // 13
            issue.closed_at.as_ref().map(format_datetime),    // 14
            issue.close_reason,                               // 15
            issue.closed_by,                                  // 16
            issue.defer_until.as_ref().map(format_datetime),  // 17
            issue.ephemeral as i32,                           // 18
            issue.pinned as i32,                              // 19
            issue.await_type,                                 // 20
            issue.external_ref,                               // 21
            issue.source_system,                              // 22
            bonded_from_str,                                  // 23
            metadata_str,                                     // 24
        ],
    )?;

    for label in &issue.labels {
        conn.execute(
            "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?1, ?2)",
            params![issue.id, label],
        )?;
    }

    emit_event(conn, &issue.id, EventType::Created, actor, None, None, &now_str)?;

    Ok(())
}

/// Emits an event row into the events table.
pub(crate) fn emit_event(
    conn: &Connection,
    issue_id: &str,
    event_type: EventType,
    actor: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    created_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO events (issue_id, event_type, actor, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            issue_id,
            event_type.as_str(),
            actor,
            old_value,
            new_value,
            created_at,
        ],
    )?;
    Ok(())
}

/// Retrieves a single issue by ID on the given connection.
pub(crate) fn get_issue_on_conn(conn: &Connection, id: &str) -> Result<Issue> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_issue)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("issue", id),
            other => StorageError::Query(other),
        })
}

/// Applies partial updates on the given connection.
pub(crate) fn update_issue_on_conn(
    conn: &Connection,
    id: &str,
    updates: &IssueUpdates,
    actor: &str,
) -> Result<()> {
    let now = Utc::now();
    let now_str = format_datetime(&now);

    let mut set_clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    macro_rules! add_field {
        ($field:ident, $col:expr) => {
            if let Some(ref val) = updates.$field {
                set_clauses.push(format!("{} = ?", $col));
                param_values.push(Box::new(val.clone()));
            }
        };
    }

    add_field!(title, "title");
    add_field!(description, "description");
    add_field!(design, "design");
    add_field!(acceptance_criteria, "acceptance_criteria");
    add_field!(notes, "notes");
    add_field!(assignee, "assignee");
    add_field!(close_reason, "close_reason");
    add_field!(closed_by, "closed_by");
    add_field!(await_type, "await_type");
    add_field!(source_system, "source_system");

    if let Some(ref status) = updates.status {
        set_clauses.push("status = ?".to_string());
        param_values.push(Box::new(status.as_str().to_string()));
    }
    if let Some(ref issue_type) = updates.issue_type {
        set_clauses.push("issue_type = ?".to_string());
        param_values.push(Box::new(issue_type.as_str().to_string()));
    }
    if let Some(priority) = updates.priority {
        set_clauses.push("priority = ?".to_string());
        param_values.push(Box::new(priority));
    }
    if let Some(ephemeral) = updates.ephemeral {
        set_clauses.push("ephemeral = ?".to_string());
        param_values.push(Box::new(ephemeral as i32));
    }
    if let Some(pinned) = updates.pinned {
        set_clauses.push("pinned = ?".to_string());
        param_values.push(Box::new(pinned as i32));
    }

    // Option<Option<T>> fields: outer Some means "update", inner Option
    // is the new value (None clears the column).
    if let Some(ref closed_at) = updates.closed_at {
        set_clauses.push("closed_at = ?".to_string());
        param_values.push(Box::new(closed_at.as_ref().map(format_datetime)));
    }
    if let Some(ref defer) = updates.defer_until {
        set_clauses.push("defer_until = ?".to_string());
        param_values.push(Box::new(defer.as_ref().map(format_datetime)));
    }
    if let Some(ref ext) = updates.external_ref {
        set_clauses.push("external_ref = ?".to_string());
        param_values.push(Box::new(ext.clone()));
    }
    if let Some(ref meta) = updates.metadata {
        set_clauses.push("metadata = ?".to_string());
        param_values.push(Box::new(meta.clone().unwrap_or_else(|| "{}".to_string())));
    }
    if let Some(ref refs) = updates.bonded_from {
        set_clauses.push("bonded_from = ?".to_string());
        param_values.push(Box::new(
            serde_json::to_string(refs).unwrap_or_else(|_| "[]".to_string()),
        ));
    }

    if set_clauses.is_empty() {
        return Ok(()); // Nothing to update.
    }

    // Always advance updated_at.
    set_clauses.push("updated_at = ?".to_string());
    param_values.push(Box::new(now_str.clone()));

    let sql = format!("UPDATE issues SET {} WHERE id = ?", set_clauses.join(", "));
    param_values.push(Box::new(id.to_string()));

    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();

    let affected = conn.execute(&sql, param_refs.as_slice())?;
    if affected == 0 {
        return Err(StorageError::not_found("issue", id));
    }

    emit_event(conn, id, EventType::Updated, actor, None, None, &now_str)?;

    Ok(())
}

/// Closes an issue on the given connection.
pub(crate) fn close_issue_on_conn(
    conn: &Connection,
    id: &str,
    reason: &str,
    actor: &str,
) -> Result<()> {
    let now = Utc::now();
    let now_str = format_datetime(&now);

    let affected = conn.execute(
        "UPDATE issues SET status = 'closed', closed_at = ?1, close_reason = ?2,
         closed_by = ?3, updated_at = ?1 WHERE id = ?4",
        params![now_str, reason, actor, id],
    )?;
    if affected == 0 {
        return Err(StorageError::not_found("issue", id));
    }

    emit_event(conn, id, EventType::Closed, actor, None, Some(reason), &now_str)?;

    Ok(())
}

/// Reopens a closed issue on the given connection, clearing closure
/// fields and emitting the distinct "reopened" observation.
pub(crate) fn reopen_issue_on_conn(conn: &Connection, id: &str, actor: &str) -> Result<()> {
    let now = Utc::now();
    let now_str = format_datetime(&now);

    let affected = conn.execute(
        "UPDATE issues SET status = 'open', closed_at = NULL, close_reason = '',
         closed_by = '', updated_at = ?1 WHERE id = ?2",
        params![now_str, id],
    )?;
    if affected == 0 {
        return Err(StorageError::not_found("issue", id));
    }

    emit_event(conn, id, EventType::Reopened, actor, None, None, &now_str)?;

    Ok(())
}

/// Deletes an issue on the given connection. FK cascades remove labels,
/// events, and outbound edges.
pub(crate) fn delete_issue_on_conn(conn: &Connection, id: &str) -> Result<()> {
    // Inbound edges reference this id without an FK; clear them too.
    conn.execute(
        "DELETE FROM dependencies WHERE depends_on_id = ?1",
        params![id],
    )?;
    let affected = conn.execute("DELETE FROM issues WHERE id = ?1", params![id])?;
    if affected == 0 {
        return Err(StorageError::not_found("issue", id));
    }
    Ok(())
}

/// Searches issues on the given connection.
pub(crate) fn search_issues_on_conn(
    conn: &Connection,
    query: &str,
    filter: &IssueFilter,
) -> Result<Vec<Issue>> {
    let mut where_clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut param_idx = 1;

    // Substring search across title, description, notes.
    if !query.is_empty() {
        where_clauses.push(format!(
            "(title LIKE ?{pi} OR description LIKE ?{pi} OR notes LIKE ?{pi})",
            pi = param_idx
        ));
        param_values.push(Box::new(format!("%{query}%")));
        param_idx += 1;
    }

    if let Some(ref status) = filter.status {
        where_clauses.push(format!("status = ?{param_idx}"));
        param_values.push(Box::new(status.as_str().to_string()));
        param_idx += 1;
    }
    if let Some(ref assignee) = filter.assignee {
        where_clauses.push(format!("assignee = ?{param_idx}"));
        param_values.push(Box::new(assignee.clone()));
        param_idx += 1;
    }
    if let Some(ref issue_type) = filter.issue_type {
        where_clauses.push(format!("issue_type = ?{param_idx}"));
        param_values.push(Box::new(issue_type.as_str().to_string()));
        param_idx += 1;
    }
    if let Some(min) = filter.priority_min {
        where_clauses.push(format!("priority >= ?{param_idx}"));
        param_values.push(Box::new(min));
        param_idx += 1;
    }
    if let Some(max) = filter.priority_max {
        where_clauses.push(format!("priority <= ?{param_idx}"));
        param_values.push(Box::new(max));
        param_idx += 1;
    }

    // Date windows.
    macro_rules! add_date {
        ($field:ident, $col:expr, $op:expr) => {
            if let Some(ref dt) = filter.$field {
                where_clauses.push(format!("{} {} ?{}", $col, $op, param_idx));
                param_values.push(Box::new(format_datetime(dt)));
                param_idx += 1;
            }
        };
    }
    add_date!(created_after, "created_at", ">=");
    add_date!(created_before, "created_at", "<=");
    add_date!(updated_after, "updated_at", ">=");
    add_date!(updated_before, "updated_at", "<=");
    add_date!(closed_after, "closed_at", ">=");
    add_date!(closed_before, "closed_at", "<=");

    // Substring probes.
    if let Some(ref desc) = filter.description_contains {
        where_clauses.push(format!("description LIKE ?{param_idx}"));
        param_values.push(Box::new(format!("%{desc}%")));
        param_idx += 1;
    }
    if let Some(ref notes) = filter.notes_contains {
        where_clauses.push(format!("notes LIKE ?{param_idx}"));
        param_values.push(Box::new(format!("%{notes}%")));
        param_idx += 1;
    }

    // Empty/null checks.
    if filter.empty_description {
        where_clauses.push("(description IS NULL OR description = '')".to_string());
    }
    if filter.no_assignee {
        where_clauses.push("(assignee IS NULL OR assignee = '')".to_string());
    }
    if filter.no_labels {
        where_clauses
            .push("NOT EXISTS (SELECT 1 FROM labels WHERE labels.issue_id = issues.id)".to_string());
    }

    // Label filters (AND).
    for label in &filter.labels_all {
        where_clauses.push(format!(
            "EXISTS (SELECT 1 FROM labels WHERE labels.issue_id = issues.id AND labels.label = ?{param_idx})"
        ));
        param_values.push(Box::new(label.clone()));
        param_idx += 1;
    }

    // Label filters (OR).
    if !filter.labels_any.is_empty() {
        let placeholders: Vec<String> = filter
            .labels_any
            .iter()
            .enumerate()
            .map(|(j, _)| format!("?{}", param_idx + j))
            .collect();
        where_clauses.push(format!(
            "EXISTS (SELECT 1 FROM labels WHERE labels.issue_id = issues.id AND labels.label IN ({}))",
            placeholders.join(",")
        ));
        for label in &filter.labels_any {
            param_values.push(Box::new(label.clone()));
        }
        param_idx += filter.labels_any.len();
    }

    // Metadata probes.
    if let Some((ref field, ref value)) = filter.metadata_field_equals {
        where_clauses.push(format!(
            "json_extract(metadata, '$.' || ?{}) = ?{}",
            param_idx,
            param_idx + 1
        ));
        param_values.push(Box::new(field.clone()));
        param_values.push(Box::new(value.clone()));
        param_idx += 2;
    }
    if let Some(ref key) = filter.has_metadata_key {
        where_clauses.push(format!(
            "json_type(metadata, '$.' || ?{param_idx}) IS NOT NULL"
        ));
        param_values.push(Box::new(key.clone()));
        param_idx += 1;
    }

    // Id patterns.
    if let Some(ref glob) = filter.ids_glob {
        where_clauses.push(format!("id GLOB ?{param_idx}"));
        param_values.push(Box::new(glob.clone()));
        param_idx += 1;
    }
    if let Some(ref prefix) = filter.id_prefix {
        where_clauses.push(format!("id >= ?{} AND id < ?{}", param_idx, param_idx + 1));
        // Prefix range scan: [prefix, prefix + 0x7f) covers ASCII ids.
        param_values.push(Box::new(prefix.clone()));
        param_values.push(Box::new(format!("{prefix}\u{7f}")));
        param_idx += 2;
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_clauses.join(" AND "))
    };

    let limit_sql = filter
        .limit
        .map(|l| format!(" LIMIT {l}"))
        .unwrap_or_default();

    let sql = format!(
        "SELECT {ISSUE_COLUMNS} FROM issues{where_sql} ORDER BY priority ASC, updated_at DESC, id ASC{limit_sql}"
    );

    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), scan_issue)?;

    let mut issues = Vec::new();
    for row in rows {
        issues.push(row?);
    }

    let _ = param_idx;
    Ok(issues)
}

// ---------------------------------------------------------------------------
// SqliteStore issue methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub(crate) fn create_issue_impl(&self, issue: &Issue, actor: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        insert_issue(&conn, issue, actor)
    }

    pub(crate) fn create_issues_impl(&self, issues: &[Issue], actor: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::Transaction(format!("failed to begin: {e}")))?;
        for issue in issues {
            insert_issue(&tx, issue, actor)?;
        }
        tx.commit()
            .map_err(|e| StorageError::Transaction(format!("failed to commit: {e}")))?;
        Ok(())
    }

    pub(crate) fn get_issue_impl(&self, id: &str) -> Result<Issue> {
        let conn = self.lock_conn()?;
        get_issue_on_conn(&conn, id)
    }

    pub(crate) fn get_issues_by_ids_impl(&self, ids: &[String]) -> Result<Vec<Issue>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock_conn()?;
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), scan_issue)?;
        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        Ok(issues)
    }

    pub(crate) fn update_issue_impl(
        &self,
        id: &str,
        updates: &IssueUpdates,
        actor: &str,
    ) -> Result<()> {
        let conn = self.lock_conn()?;
        update_issue_on_conn(&conn, id, updates, actor)
    }

    pub(crate) fn close_issue_impl(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        close_issue_on_conn(&conn, id, reason, actor)
    }

    pub(crate) fn reopen_issue_impl(&self, id: &str, actor: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        reopen_issue_on_conn(&conn, id, actor)
    }

    pub(crate) fn delete_issue_impl(&self, id: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        delete_issue_on_conn(&conn, id)
    }

    pub(crate) fn search_issues_impl(
        &self,
        query: &str,
        filter: &IssueFilter,
    ) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        search_issues_on_conn(&conn, query, filter)
    }

    pub(crate) fn get_events_impl(&self, issue_id: &str, limit: i32) -> Result<Vec<Event>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, issue_id, event_type, actor, old_value, new_value, created_at
             FROM events WHERE issue_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![issue_id, limit], |row| {
            Ok(Event {
                id: row.get(0)?,
                issue_id: row.get(1)?,
                event_type: beads_core::enums::EventType::from(
                    row.get::<_, String>(2)?.as_str(),
                ),
                actor: row.get(3)?,
                old_value: row.get(4)?,
                new_value: row.get(5)?,
                created_at: parse_datetime(&row.get::<_, String>(6)?),
            })
        })?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}
