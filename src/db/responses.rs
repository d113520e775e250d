use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{
    named_params, Connection, Row, ToSql,
    types::{
        FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef
    },
};
use tracing::{debug, info, warn};

use crate::db::conn::Database;
use crate::error::StoreResult;

/// Column order of the responses table.
pub const COLUMNS: [&str; 9] = [
    "id",
    "timestamp",
    "department",
    "stress_q1",
    "stress_q2",
    "stress_q3",
    "motivation_q1",
    "motivation_q2",
    "motivation_q3",
];

#[derive(Clone, Debug, PartialEq)]
pub struct DbTimestamp(pub DateTime<Utc>);

/// Answers to the three stress and three motivation questions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ratings {
    pub stress: [i64; 3],
    pub motivation: [i64; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub id: i64,
    /// `None` when the stored value could not be parsed
    pub timestamp: Option<DateTime<Utc>>,
    pub department: String,
    pub ratings: Ratings,
}

impl Ratings {
    pub fn new(stress: [i64; 3], motivation: [i64; 3]) -> Self {
        Self { stress, motivation }
    }

    pub fn stress_avg(&self) -> f64 {
        mean(&self.stress)
    }

    pub fn motivation_avg(&self) -> f64 {
        mean(&self.motivation)
    }
}

impl Response {
    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date_naive())
    }
}

fn mean(values: &[i64; 3]) -> f64 {
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

/// Accepts RFC 3339 as well as the offset-less ISO forms older rows were
/// written in (seconds optional, or a bare date), which are taken to be UTC.
///
/// This is the only reading of a stored timestamp; date filters in the
/// store and in reports both go through it.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .or_else(|| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
    .map(|ts| ts.and_utc())
}

fn within_date_range(
    date: NaiveDate,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> bool {
    let after_start = start_date.map_or(true, |sdate| sdate <= date);
    let before_end = end_date.map_or(true, |edate| date <= edate);
    after_start && before_end
}

/// Inclusive date bounds against a response date. An unknown date only
/// matches when neither bound is set.
pub fn matches_dates(
    date: Option<NaiveDate>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> bool {
    if start_date.is_none() && end_date.is_none() {
        return true;
    }

    date.is_some_and(|d| within_date_range(d, start_date, end_date))
}

impl FromSql for DbTimestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value).and_then(|as_string| {
            parse_timestamp(as_string.as_str())
                .map(DbTimestamp)
                .ok_or_else(|| FromSqlError::Other(format!("bad timestamp {:?}", as_string).into()))
        })
    }
}

impl ToSql for DbTimestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let ts: String = self.0.to_rfc3339_opts(SecondsFormat::Micros, true);
        Ok(ToSqlOutput::from(ts))
    }
}

/// Appends, loads and deletes survey responses. Expects the schema manager
/// to have brought the table up to date first.
pub struct ResponseStore {
    db: Database,
}

impl ResponseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store one response stamped with the current UTC time. Ratings are
    /// persisted as given; range checks belong to the caller.
    pub fn add_response(&self, department: &str, ratings: Ratings) -> StoreResult<i64> {
        let conn = self.db.open()?;
        let id = insert_response(&conn, Utc::now(), department, &ratings)?;
        info!(id, department, "Stored response");

        Ok(id)
    }

    /// Every stored response in ascending id order, which is also
    /// submission order.
    pub fn load_all(&self) -> StoreResult<Vec<Response>> {
        let conn = self.db.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, department,
                stress_q1, stress_q2, stress_q3,
                motivation_q1, motivation_q2, motivation_q3
            FROM responses
            ORDER BY id",
        )?;

        let rows = stmt.query_map([], response_from_row)?;
        let responses = rows.collect::<rusqlite::Result<Vec<Response>>>()?;
        debug!(count = responses.len(), "Loaded responses");

        Ok(responses)
    }

    /// Number of rows `delete_responses` would remove with the same filters.
    pub fn count_matching(
        &self,
        department: Option<&str>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> StoreResult<usize> {
        let conn = self.db.open()?;
        let ids = matching_ids(&conn, department, start_date, end_date)?;

        Ok(ids.len())
    }

    /// Delete responses matching every filter given. Dates are inclusive and
    /// compared against the calendar date of the timestamp only.
    ///
    /// With no filters at all every row is deleted.
    pub fn delete_responses(
        &self,
        department: Option<&str>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> StoreResult<usize> {
        let mut conn = self.db.open()?;
        let tx = conn.transaction()?;

        let ids = matching_ids(&tx, department, start_date, end_date)?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM responses WHERE id = ?1")?;
            for id in &ids {
                deleted += stmt.execute([id])?;
            }
        }
        tx.commit()?;

        info!(
            deleted,
            department = department.unwrap_or("*"),
            start_date = ?start_date,
            end_date = ?end_date,
            "Deleted responses"
        );

        Ok(deleted)
    }
}

/// Ids of the rows matching the filters, with dates read by
/// `parse_timestamp` so deletes select exactly what reports show.
fn matching_ids(
    conn: &Connection,
    department: Option<&str>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp FROM responses
        WHERE @dept IS NULL OR department = @dept
        ORDER BY id",
    )?;

    let rows = stmt.query_map(named_params! { "@dept": department }, |row| {
        let id: i64 = row.get(0)?;
        let date = timestamp_column(row, 1)?.map(|ts| ts.date_naive());
        Ok((id, date))
    })?;

    let mut ids = Vec::new();
    for row in rows {
        let (id, date) = row?;
        if matches_dates(date, start_date, end_date) {
            ids.push(id);
        }
    }

    Ok(ids)
}

fn insert_response(
    conn: &Connection,
    timestamp: DateTime<Utc>,
    department: &str,
    ratings: &Ratings,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO responses (
            timestamp, department,
            stress_q1, stress_q2, stress_q3,
            motivation_q1, motivation_q2, motivation_q3
        )
        VALUES (@ts, @dept, @s1, @s2, @s3, @m1, @m2, @m3)",
        named_params! {
            "@ts": DbTimestamp(timestamp),
            "@dept": department,
            "@s1": ratings.stress[0],
            "@s2": ratings.stress[1],
            "@s3": ratings.stress[2],
            "@m1": ratings.motivation[0],
            "@m2": ratings.motivation[1],
            "@m3": ratings.motivation[2],
        },
    )?;

    Ok(conn.last_insert_rowid())
}

/// NULL or unparseable values read as `None`.
fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, DbTimestamp>(idx) {
        Ok(ts) => Ok(Some(ts.0)),
        Err(rusqlite::Error::FromSqlConversionFailure(..))
        | Err(rusqlite::Error::InvalidColumnType(..)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn response_from_row(row: &Row<'_>) -> rusqlite::Result<Response> {
    let id: i64 = row.get(0)?;

    let timestamp = timestamp_column(row, 1)?;
    if timestamp.is_none() {
        warn!(id, "Unreadable timestamp, treating as unknown");
    }

    Ok(Response {
        id,
        timestamp,
        department: row.get(2)?,
        ratings: Ratings {
            stress: [row.get(3)?, row.get(4)?, row.get(5)?],
            motivation: [row.get(6)?, row.get(7)?, row.get(8)?],
        },
    })
}
