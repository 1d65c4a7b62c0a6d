//! Record repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD over project-scoped, section-typed records.
//! - Own the transactional bodies of tree reconciliation and literal upsert.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - A set `parent_id` resolves to a live record of the same section/project.
//! - Every mutating call runs in one immediate transaction; a failure leaves
//!   no partial write behind.
//! - Sibling order is deterministic: `rank ASC` (unset last), then `id ASC`.
//! - Ids come from one `AUTOINCREMENT` sequence and are never reused.
//! - Reserved metadata keys are stripped from payloads before they are stored.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::dependency::{build_report, GuardedDelete};
use crate::model::record::{
    find_field, is_reserved_key, key_literal, payload_from_value, without_reserved_keys,
    MalformedInput, Payload, Record, RecordId, RecordMeta, Section, TreeNode, ID_KEY,
    MANUAL_KEY, PARENT_KEY, RANK_KEY,
};
use log::{info, warn};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    section,
    project,
    parent_id,
    rank,
    manual,
    data
FROM records";

const RECORD_COLUMNS: [&str; 7] = [
    "id",
    "section",
    "project",
    "parent_id",
    "rank",
    "manual",
    "data",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from record store operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// A mandatory id does not exist in the addressed section/project.
    NotFound(RecordId),
    /// Parent reference does not resolve within the same section/project.
    ParentNotFound { parent_id: RecordId },
    /// Re-parenting would make a record its own ancestor.
    CycleDetected {
        record_id: RecordId,
        parent_id: RecordId,
    },
    /// The same existing id appears twice in one tree submission.
    DuplicateNode(RecordId),
    /// Record still has children and cannot be removed.
    HasChildren(RecordId),
    /// Storage-level constraint violation not caught by the pre-checks.
    Integrity(String),
    /// Caller input is not a valid payload or submission.
    MalformedInput(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted row cannot be converted to a valid record.
    InvalidData(String),
}

/// Coarse error category, for callers that map outcomes to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Integrity,
    NotFound,
    MalformedInput,
    Storage,
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ParentNotFound { .. }
            | Self::CycleDetected { .. }
            | Self::DuplicateNode(_)
            | Self::HasChildren(_)
            | Self::Integrity(_) => ErrorKind::Integrity,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
            Self::Db(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::InvalidData(_) => ErrorKind::Storage,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::ParentNotFound { parent_id } => {
                write!(f, "parent record {parent_id} not found in section/project")
            }
            Self::CycleDetected {
                record_id,
                parent_id,
            } => write!(
                f,
                "placing record {record_id} under {parent_id} would create a cycle"
            ),
            Self::DuplicateNode(id) => write!(f, "record {id} submitted more than once"),
            Self::HasChildren(id) => write!(f, "record {id} still has child records"),
            Self::Integrity(message) => write!(f, "integrity violation: {message}"),
            Self::MalformedInput(message) => write!(f, "malformed input: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "record repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "record repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "record repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted record: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Self::Integrity(message.clone().unwrap_or_else(|| failure.to_string()))
            }
            other => Self::Db(DbError::Sqlite(other)),
        }
    }
}

impl From<MalformedInput> for RepoError {
    fn from(value: MalformedInput) -> Self {
        Self::MalformedInput(value.0)
    }
}

/// Metadata keys merged into payloads returned by [`RecordRepository::get_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetAllOptions {
    /// Adds `_id`.
    pub with_id: bool,
    /// Adds `_parent` and `_rank` (`null` when unset).
    pub with_rank: bool,
    /// Adds `_manual`.
    pub with_manual: bool,
}

impl GetAllOptions {
    pub fn all() -> Self {
        Self {
            with_id: true,
            with_rank: true,
            with_manual: true,
        }
    }
}

/// Result of a literal-keyed upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: RecordId,
    /// `true` when a new row was inserted, `false` when one was replaced.
    pub created: bool,
}

/// Repository interface for record store operations.
pub trait RecordRepository {
    /// Inserts one record and returns its freshly assigned id.
    fn add(
        &self,
        section: Section,
        project: &str,
        data: &Payload,
        meta: &RecordMeta,
    ) -> RepoResult<RecordId>;
    /// Loads one record; `None` when absent or owned by another section/project.
    fn get(&self, id: RecordId, section: Section, project: &str) -> RepoResult<Option<Record>>;
    /// Loads a whole section keyed by id, with optional metadata keys merged in.
    fn get_all(
        &self,
        section: Section,
        project: &str,
        options: &GetAllOptions,
    ) -> RepoResult<BTreeMap<RecordId, Payload>>;
    /// Lists full records of a section in sibling order.
    fn list_records(&self, section: Section, project: &str) -> RepoResult<Vec<Record>>;
    /// Lists direct children of `parent_id` (roots for `None`) in sibling order.
    fn list_children(
        &self,
        section: Section,
        project: &str,
        parent_id: Option<RecordId>,
    ) -> RepoResult<Vec<Record>>;
    /// Replaces the payload; returns whether a row matched.
    fn update(
        &self,
        id: RecordId,
        section: Section,
        project: &str,
        data: &Payload,
    ) -> RepoResult<bool>;
    /// Replaces payload and placement metadata; returns whether a row matched.
    fn update_with_meta(
        &self,
        id: RecordId,
        section: Section,
        project: &str,
        data: &Payload,
        meta: &RecordMeta,
    ) -> RepoResult<bool>;
    /// Hard-deletes one record; returns whether a row matched.
    fn delete(&self, id: RecordId, section: Section, project: &str) -> RepoResult<bool>;
    /// Deletes one record unless a `(section, field)` pair of `look_for`
    /// finds a dependent. Scan and delete share one write transaction.
    fn delete_unreferenced(
        &self,
        id: RecordId,
        section: Section,
        project: &str,
        look_for: &[(Section, &str)],
    ) -> RepoResult<GuardedDelete>;
    /// Finds the lowest id whose serialized payload contains `literal`.
    fn exists_in_data(
        &self,
        section: Section,
        project: &str,
        literal: &str,
    ) -> RepoResult<Option<RecordId>>;
    /// Replaces the lowest-id record whose `key_field` (nested `data` scope
    /// first) equals `key_value`, or inserts `data` as a new record.
    fn upsert_matching(
        &self,
        section: Section,
        project: &str,
        key_field: &str,
        key_value: &Value,
        data: &Payload,
    ) -> RepoResult<UpsertOutcome>;
    /// Rewrites parent/rank/payload to match the submitted forest.
    ///
    /// Returns the ids of all submitted nodes in depth-first pre-order.
    fn reconcile_tree(
        &self,
        section: Section,
        project: &str,
        forest: &[TreeNode],
    ) -> RepoResult<Vec<RecordId>>;
    /// Lists distinct project names in ascending order.
    fn list_projects(&self) -> RepoResult<Vec<String>>;
}

/// SQLite-backed record repository.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_record_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn begin(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn add(
        &self,
        section: Section,
        project: &str,
        data: &Payload,
        meta: &RecordMeta,
    ) -> RepoResult<RecordId> {
        let tx = self.begin()?;
        let id = insert_record(&tx, section, project, data, meta)?;
        tx.commit()?;
        Ok(id)
    }

    fn get(&self, id: RecordId, section: Section, project: &str) -> RepoResult<Option<Record>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RECORD_SELECT_SQL}
             WHERE id = ?1
               AND section = ?2
               AND project = ?3;"
        ))?;
        let mut rows = stmt.query(params![id, section.as_str(), project])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_record_row(row)?));
        }
        Ok(None)
    }

    fn get_all(
        &self,
        section: Section,
        project: &str,
        options: &GetAllOptions,
    ) -> RepoResult<BTreeMap<RecordId, Payload>> {
        let mut result = BTreeMap::new();
        for record in self.list_records(section, project)? {
            let mut payload = record.data;
            if options.with_id {
                payload.insert(ID_KEY.to_string(), Value::from(record.id));
            }
            if options.with_rank {
                payload.insert(PARENT_KEY.to_string(), Value::from(record.parent_id));
                payload.insert(RANK_KEY.to_string(), Value::from(record.rank));
            }
            if options.with_manual {
                payload.insert(MANUAL_KEY.to_string(), Value::from(record.manual));
            }
            result.insert(record.id, payload);
        }
        Ok(result)
    }

    fn list_records(&self, section: Section, project: &str) -> RepoResult<Vec<Record>> {
        query_records(self.conn, section, project)
    }

    fn list_children(
        &self,
        section: Section,
        project: &str,
        parent_id: Option<RecordId>,
    ) -> RepoResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RECORD_SELECT_SQL}
             WHERE section = ?1
               AND project = ?2
               AND parent_id IS ?3
             ORDER BY rank IS NULL, rank ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![section.as_str(), project, parent_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }

    fn update(
        &self,
        id: RecordId,
        section: Section,
        project: &str,
        data: &Payload,
    ) -> RepoResult<bool> {
        let encoded = encode_payload(data)?;
        let changed = self.conn.execute(
            "UPDATE records
             SET data = ?4
             WHERE id = ?1
               AND section = ?2
               AND project = ?3;",
            params![id, section.as_str(), project, encoded],
        )?;
        Ok(changed > 0)
    }

    fn update_with_meta(
        &self,
        id: RecordId,
        section: Section,
        project: &str,
        data: &Payload,
        meta: &RecordMeta,
    ) -> RepoResult<bool> {
        let tx = self.begin()?;
        if !record_exists(&tx, id, section, project)? {
            return Ok(false);
        }
        if let Some(parent_id) = meta.parent_id {
            ensure_parent_resolves(&tx, section, project, parent_id)?;
            ensure_no_cycle(&tx, section, project, id, parent_id)?;
        }

        tx.execute(
            "UPDATE records
             SET data = ?4,
                 parent_id = ?5,
                 rank = ?6,
                 manual = ?7
             WHERE id = ?1
               AND section = ?2
               AND project = ?3;",
            params![
                id,
                section.as_str(),
                project,
                encode_payload(data)?,
                meta.parent_id,
                meta.rank,
                bool_to_int(meta.manual),
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn delete(&self, id: RecordId, section: Section, project: &str) -> RepoResult<bool> {
        let tx = self.begin()?;
        if !record_exists(&tx, id, section, project)? {
            return Ok(false);
        }
        delete_leaf(&tx, id, section, project)?;
        tx.commit()?;
        info!("event=record_delete module=repo status=ok section={section} id={id}");
        Ok(true)
    }

    fn delete_unreferenced(
        &self,
        id: RecordId,
        section: Section,
        project: &str,
        look_for: &[(Section, &str)],
    ) -> RepoResult<GuardedDelete> {
        let tx = self.begin()?;
        if !record_exists(&tx, id, section, project)? {
            return Ok(GuardedDelete::NotFound);
        }

        let report = build_report(id, look_for, |scanned| {
            query_records(&tx, scanned, project)
        })?;
        if !report.is_empty() {
            info!(
                "event=record_delete module=repo status=blocked section={section} id={id} dependent_sections={}",
                report.len()
            );
            return Ok(GuardedDelete::Blocked(report));
        }

        delete_leaf(&tx, id, section, project)?;
        tx.commit()?;
        info!("event=record_delete module=repo status=ok section={section} id={id} guarded=true");
        Ok(GuardedDelete::Deleted)
    }

    fn exists_in_data(
        &self,
        section: Section,
        project: &str,
        literal: &str,
    ) -> RepoResult<Option<RecordId>> {
        find_by_literal(self.conn, section, project, literal)
    }

    fn upsert_matching(
        &self,
        section: Section,
        project: &str,
        key_field: &str,
        key_value: &Value,
        data: &Payload,
    ) -> RepoResult<UpsertOutcome> {
        let literal = key_literal(key_field, key_value)?;
        let tx = self.begin()?;
        let outcome = match find_by_key(&tx, section, project, &literal, key_field, key_value)? {
            Some(id) => {
                tx.execute(
                    "UPDATE records
                     SET data = ?2
                     WHERE id = ?1;",
                    params![id, encode_payload(data)?],
                )?;
                UpsertOutcome { id, created: false }
            }
            None => UpsertOutcome {
                id: insert_record(&tx, section, project, data, &RecordMeta::default())?,
                created: true,
            },
        };
        tx.commit()?;
        info!(
            "event=record_upsert module=repo status=ok section={section} id={} created={}",
            outcome.id, outcome.created
        );
        Ok(outcome)
    }

    fn reconcile_tree(
        &self,
        section: Section,
        project: &str,
        forest: &[TreeNode],
    ) -> RepoResult<Vec<RecordId>> {
        ensure_payloads_present(forest)?;

        let tx = self.begin()?;
        let mut visited = Vec::new();
        let mut seen = HashSet::new();
        let mut created = 0usize;

        // (node, parent id, rank among submitted siblings)
        let mut stack: Vec<(&TreeNode, Option<RecordId>, i64)> = forest
            .iter()
            .enumerate()
            .rev()
            .map(|(index, node)| (node, None, index as i64))
            .collect();

        while let Some((node, parent_id, rank)) = stack.pop() {
            let node_id = match node {
                TreeNode::Existing { id, payload, .. } => {
                    let id = *id;
                    if !record_exists(&tx, id, section, project)? {
                        return Err(RepoError::NotFound(id));
                    }
                    if let Some(parent_id) = parent_id {
                        ensure_no_cycle(&tx, section, project, id, parent_id)?;
                    }
                    if !seen.insert(id) {
                        return Err(RepoError::DuplicateNode(id));
                    }
                    tx.execute(
                        "UPDATE records
                         SET data = ?2,
                             parent_id = ?3,
                             rank = ?4
                         WHERE id = ?1;",
                        params![id, encode_payload(payload)?, parent_id, rank],
                    )?;
                    id
                }
                TreeNode::New { payload, .. } => {
                    let meta = RecordMeta {
                        parent_id,
                        rank: Some(rank),
                        manual: false,
                    };
                    created += 1;
                    insert_record(&tx, section, project, payload, &meta)?
                }
            };

            visited.push(node_id);
            stack.extend(
                node.children()
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(index, child)| (child, Some(node_id), index as i64)),
            );
        }

        tx.commit()?;
        info!(
            "event=tree_reconcile module=repo status=ok section={section} nodes={} created={created}",
            visited.len()
        );
        Ok(visited)
    }

    fn list_projects(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT project
             FROM records
             ORDER BY project ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(row.get(0)?);
        }
        Ok(projects)
    }
}

fn insert_record(
    conn: &Connection,
    section: Section,
    project: &str,
    data: &Payload,
    meta: &RecordMeta,
) -> RepoResult<RecordId> {
    if let Some(parent_id) = meta.parent_id {
        ensure_parent_resolves(conn, section, project, parent_id)?;
    }
    conn.execute(
        "INSERT INTO records (
            section,
            project,
            parent_id,
            rank,
            manual,
            data
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            section.as_str(),
            project,
            meta.parent_id,
            meta.rank,
            bool_to_int(meta.manual),
            encode_payload(data)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn query_records(conn: &Connection, section: Section, project: &str) -> RepoResult<Vec<Record>> {
    let mut stmt = conn.prepare(&format!(
        "{RECORD_SELECT_SQL}
         WHERE section = ?1
           AND project = ?2
         ORDER BY rank IS NULL, rank ASC, id ASC;"
    ))?;
    let mut rows = stmt.query(params![section.as_str(), project])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_record_row(row)?);
    }
    Ok(records)
}

/// Deletes an existing record, refusing while it still has children.
fn delete_leaf(conn: &Connection, id: RecordId, section: Section, project: &str) -> RepoResult<()> {
    let has_children: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM records
            WHERE parent_id = ?1
        );",
        [id],
        |row| row.get(0),
    )?;
    if has_children == 1 {
        warn!(
            "event=record_delete module=repo status=error section={section} id={id} error_code=has_children"
        );
        return Err(RepoError::HasChildren(id));
    }

    conn.execute(
        "DELETE FROM records
         WHERE id = ?1
           AND section = ?2
           AND project = ?3;",
        params![id, section.as_str(), project],
    )?;
    Ok(())
}

fn ensure_payloads_present(forest: &[TreeNode]) -> RepoResult<()> {
    let mut stack: Vec<&TreeNode> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        if node.payload().keys().all(|key| is_reserved_key(key)) {
            return Err(RepoError::MalformedInput(match node.id() {
                Some(id) => format!("tree node {id} has no payload"),
                None => "new tree node has no payload".to_string(),
            }));
        }
        stack.extend(node.children());
    }
    Ok(())
}

fn record_exists(
    conn: &Connection,
    id: RecordId,
    section: Section,
    project: &str,
) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM records
            WHERE id = ?1
              AND section = ?2
              AND project = ?3
        );",
        params![id, section.as_str(), project],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_parent_resolves(
    conn: &Connection,
    section: Section,
    project: &str,
    parent_id: RecordId,
) -> RepoResult<()> {
    if record_exists(conn, parent_id, section, project)? {
        Ok(())
    } else {
        Err(RepoError::ParentNotFound { parent_id })
    }
}

fn ensure_no_cycle(
    conn: &Connection,
    section: Section,
    project: &str,
    record_id: RecordId,
    parent_id: RecordId,
) -> RepoResult<()> {
    let cycle = RepoError::CycleDetected {
        record_id,
        parent_id,
    };
    let mut visited = HashSet::new();
    let mut cursor = Some(parent_id);
    while let Some(current) = cursor {
        if current == record_id || !visited.insert(current) {
            return Err(cycle);
        }
        cursor = conn
            .query_row(
                "SELECT parent_id
                 FROM records
                 WHERE id = ?1
                   AND section = ?2
                   AND project = ?3;",
                params![current, section.as_str(), project],
                |row| row.get::<_, Option<RecordId>>(0),
            )
            .optional()?
            .ok_or(RepoError::ParentNotFound { parent_id: current })?;
    }
    Ok(())
}

fn find_by_literal(
    conn: &Connection,
    section: Section,
    project: &str,
    literal: &str,
) -> RepoResult<Option<RecordId>> {
    if literal.is_empty() {
        return Err(RepoError::MalformedInput(
            "search literal must not be empty".to_string(),
        ));
    }
    let id = conn
        .query_row(
            "SELECT id
             FROM records
             WHERE section = ?1
               AND project = ?2
               AND instr(data, ?3) > 0
             ORDER BY id ASC
             LIMIT 1;",
            params![section.as_str(), project, literal],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Lowest id whose stored text contains `literal` and whose parsed
/// `key_field` equals `key_value`.
fn find_by_key(
    conn: &Connection,
    section: Section,
    project: &str,
    literal: &str,
    key_field: &str,
    key_value: &Value,
) -> RepoResult<Option<RecordId>> {
    let mut stmt = conn.prepare(
        "SELECT id, data
         FROM records
         WHERE section = ?1
           AND project = ?2
           AND instr(data, ?3) > 0
         ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query(params![section.as_str(), project, literal])?;
    while let Some(row) = rows.next()? {
        let id: RecordId = row.get(0)?;
        let data_text: String = row.get(1)?;
        let candidate = decode_payload(&data_text)?;
        if find_field(&candidate, key_field).map(|(_, value)| value) == Some(key_value) {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<Record> {
    let section_text: String = row.get("section")?;
    let section = section_text.parse::<Section>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid section `{section_text}` in records.section"
        ))
    })?;

    let manual = match row.get::<_, i64>("manual")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid manual value `{other}` in records.manual"
            )));
        }
    };

    let data_text: String = row.get("data")?;
    let data = decode_payload(&data_text)?;

    Ok(Record {
        id: row.get("id")?,
        section,
        project: row.get("project")?,
        parent_id: row.get("parent_id")?,
        rank: row.get("rank")?,
        manual,
        data,
    })
}

fn encode_payload(data: &Payload) -> RepoResult<String> {
    let encoded = if data.keys().any(|key| is_reserved_key(key)) {
        serde_json::to_string(&without_reserved_keys(data))
    } else {
        serde_json::to_string(data)
    };
    encoded.map_err(|err| RepoError::MalformedInput(format!("payload is not serializable: {err}")))
}

fn decode_payload(data_text: &str) -> RepoResult<Payload> {
    serde_json::from_str::<Value>(data_text)
        .map_err(|err| RepoError::InvalidData(format!("invalid json in records.data: {err}")))
        .and_then(|value| payload_from_value(value).map_err(|err| RepoError::InvalidData(err.0)))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_record_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "records")? {
        return Err(RepoError::MissingRequiredTable("records"));
    }

    for column in RECORD_COLUMNS {
        if !table_has_column(conn, "records", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "records",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
