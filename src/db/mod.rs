use std::{
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{LeaderboardEntry, SessionRecord, SessionType, UserProfile, UserStats};
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("value {value} is negative"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn session_type_from_str(value: &str) -> Result<SessionType> {
    match value {
        "focus" => Ok(SessionType::Focus),
        "short_break" => Ok(SessionType::ShortBreak),
        "long_break" => Ok(SessionType::LongBreak),
        _ => Err(anyhow!("unknown session type '{value}'")),
    }
}

/// Whole minutes for a session duration, rounded to the nearest minute.
fn rounded_minutes(duration_seconds: i64) -> i64 {
    (duration_seconds as f64 / 60.0).round() as i64
}

/// All SQLite access funnels through a dedicated worker thread; async
/// callers hand a closure over an mpsc queue and await the reply on a
/// oneshot. Serializing through one connection keeps profile aggregates and
/// session inserts atomic without connection pooling.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("studysentry-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Idempotent profile creation for the attached user.
    pub async fn ensure_profile(&self, user_id: &str, display_name: Option<&str>) -> Result<()> {
        let user_id = user_id.to_string();
        let display_name = display_name.map(|name| name.to_string());
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO user_profiles (id, display_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     display_name = COALESCE(excluded.display_name, display_name),
                     updated_at = excluded.updated_at",
                params![user_id, display_name, now],
            )
            .with_context(|| "failed to ensure user profile")?;
            Ok(())
        })
        .await
    }

    /// Insert a finished session. For focus sessions the profile aggregates
    /// (study time, session count, daily streak) advance in the same
    /// transaction, so the leaderboard never sees a half-applied session.
    pub async fn create_session(&self, record: &SessionRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open session transaction")?;

            tx.execute(
                "INSERT OR IGNORE INTO user_profiles (id, created_at, updated_at)
                 VALUES (?1, ?2, ?2)",
                params![record.user_id, record.created_at.to_rfc3339()],
            )
            .with_context(|| "failed to materialize user profile")?;

            tx.execute(
                "INSERT INTO sessions (id, user_id, duration_seconds, completed_at, session_type,
                                       distraction_count, was_completed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.user_id,
                    to_i64(record.duration_seconds)?,
                    record.completed_at.to_rfc3339(),
                    record.session_type.as_str(),
                    to_i64(record.distraction_count)?,
                    record.was_completed,
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert session")?;

            if record.session_type == SessionType::Focus {
                let session_date = record.completed_at.date_naive();
                let (streak_before, last_session_date): (i64, Option<String>) = tx
                    .query_row(
                        "SELECT current_streak, last_session_date FROM user_profiles WHERE id = ?1",
                        params![record.user_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .with_context(|| "failed to read profile for streak update")?;

                let streak =
                    advance_streak(streak_before, last_session_date.as_deref(), session_date)?;

                tx.execute(
                    "UPDATE user_profiles
                     SET total_study_seconds = total_study_seconds + ?1,
                         total_sessions = total_sessions + 1,
                         current_streak = ?2,
                         longest_streak = MAX(longest_streak, ?2),
                         last_session_date = ?3,
                         updated_at = ?4
                     WHERE id = ?5",
                    params![
                        to_i64(record.duration_seconds)?,
                        streak,
                        session_date.to_string(),
                        record.completed_at.to_rfc3339(),
                        record.user_id,
                    ],
                )
                .with_context(|| "failed to update profile aggregates")?;
            }

            tx.commit().context("failed to commit session")?;
            Ok(())
        })
        .await
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT id, display_name, total_study_seconds, total_sessions, current_streak,
                        longest_streak, last_session_date, created_at, updated_at
                 FROM user_profiles WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()
            .with_context(|| "failed to load user profile")?
            .map(
                |(
                    id,
                    display_name,
                    total_study_seconds,
                    total_sessions,
                    current_streak,
                    longest_streak,
                    last_session_date,
                    created_at,
                    updated_at,
                )| {
                    Ok(UserProfile {
                        id,
                        display_name,
                        total_study_seconds: to_u64(total_study_seconds)?,
                        total_sessions: to_u64(total_sessions)?,
                        current_streak: to_u64(current_streak)?,
                        longest_streak: to_u64(longest_streak)?,
                        last_session_date,
                        created_at: parse_datetime(&created_at)?,
                        updated_at: parse_datetime(&updated_at)?,
                    })
                },
            )
            .transpose()
        })
        .await
    }

    /// Aggregated statistics for one user: today / trailing week / trailing
    /// month minutes from the session log, lifetime totals from the profile.
    pub async fn get_user_stats(&self, user_id: &str) -> Result<UserStats> {
        let user_id = user_id.to_string();
        let now = Utc::now();
        self.execute(move |conn| {
            let today_start = now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow!("invalid day boundary"))?
                .and_utc();
            let today_end = today_start + Days::new(1);
            let week_ago = now - Days::new(7);
            let month_ago = now
                .checked_sub_months(Months::new(1))
                .ok_or_else(|| anyhow!("invalid month boundary"))?;

            let mut today_minutes = 0;
            let mut today_sessions = 0;
            {
                let mut stmt = conn.prepare(
                    "SELECT duration_seconds, session_type FROM sessions
                     WHERE user_id = ?1 AND completed_at >= ?2 AND completed_at < ?3",
                )?;
                let mut rows = stmt.query(params![
                    user_id,
                    today_start.to_rfc3339(),
                    today_end.to_rfc3339()
                ])?;
                while let Some(row) = rows.next()? {
                    today_minutes += rounded_minutes(row.get::<_, i64>(0)?);
                    if row.get::<_, String>(1)? == "focus" {
                        today_sessions += 1;
                    }
                }
            }

            let window_minutes = |conn: &Connection, since: DateTime<Utc>| -> Result<i64> {
                let mut stmt = conn.prepare(
                    "SELECT duration_seconds FROM sessions
                     WHERE user_id = ?1 AND completed_at >= ?2",
                )?;
                let mut rows = stmt.query(params![user_id, since.to_rfc3339()])?;
                let mut minutes = 0;
                while let Some(row) = rows.next()? {
                    minutes += rounded_minutes(row.get::<_, i64>(0)?);
                }
                Ok(minutes)
            };

            let week_minutes = window_minutes(conn, week_ago)?;
            let month_minutes = window_minutes(conn, month_ago)?;

            let profile: Option<(i64, i64, i64)> = conn
                .query_row(
                    "SELECT total_study_seconds, total_sessions, current_streak
                     FROM user_profiles WHERE id = ?1",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .with_context(|| "failed to load profile totals")?;

            let (total_study_seconds, total_sessions, streak) = profile.unwrap_or((0, 0, 0));
            let total_minutes = rounded_minutes(total_study_seconds);
            let average_session_length = if total_sessions > 0 {
                (total_minutes as f64 / total_sessions as f64).round() as i64
            } else {
                0
            };

            Ok(UserStats {
                today_minutes,
                today_sessions,
                week_minutes,
                month_minutes,
                total_minutes,
                total_sessions,
                average_session_length,
                streak,
            })
        })
        .await
    }

    /// Top profiles by lifetime study time. Ties keep their relative order
    /// from the scan, which SQLite makes stable for a fixed table.
    pub async fn get_leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT display_name, total_study_seconds, total_sessions
                 FROM user_profiles
                 ORDER BY total_study_seconds DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                let display_name: Option<String> = row.get(0)?;
                entries.push(LeaderboardEntry {
                    display_name: display_name.unwrap_or_else(|| "Anonymous".to_string()),
                    total_study_minutes: rounded_minutes(row.get::<_, i64>(1)?),
                    total_sessions: row.get(2)?,
                    rank: entries.len() as i64 + 1,
                });
            }
            Ok(entries)
        })
        .await
    }

    /// 1 + number of users with strictly more study time; 0 for an unknown
    /// user.
    pub async fn get_user_rank(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let total: Option<i64> = conn
                .query_row(
                    "SELECT total_study_seconds FROM user_profiles WHERE id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| "failed to load profile for rank")?;

            let Some(total) = total else {
                return Ok(0);
            };

            let ahead: i64 = conn.query_row(
                "SELECT COUNT(*) FROM user_profiles WHERE total_study_seconds > ?1",
                params![total],
                |row| row.get(0),
            )?;
            Ok(ahead + 1)
        })
        .await
    }

    pub async fn list_recent_sessions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<SessionRecord>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, duration_seconds, completed_at, session_type,
                        distraction_count, was_completed, created_at
                 FROM sessions
                 WHERE user_id = ?1
                 ORDER BY completed_at DESC
                 LIMIT ?2",
            )?;

            let mut rows = stmt.query(params![user_id, limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(SessionRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    duration_seconds: to_u64(row.get::<_, i64>(2)?)?,
                    completed_at: parse_datetime(&row.get::<_, String>(3)?)?,
                    session_type: session_type_from_str(&row.get::<_, String>(4)?)?,
                    distraction_count: to_u64(row.get::<_, i64>(5)?)?,
                    was_completed: row.get(6)?,
                    created_at: parse_datetime(&row.get::<_, String>(7)?)?,
                });
            }
            Ok(sessions)
        })
        .await
    }
}

/// Streak rule: same day keeps the streak, the day after extends it, any
/// gap restarts at 1.
fn advance_streak(
    current_streak: i64,
    last_session_date: Option<&str>,
    session_date: NaiveDate,
) -> Result<i64> {
    let Some(last) = last_session_date else {
        return Ok(1);
    };
    let last: NaiveDate = last
        .parse()
        .map_err(|err| anyhow!("invalid last_session_date '{last}': {err}"))?;

    if last == session_date {
        Ok(current_streak.max(1))
    } else if last + Days::new(1) == session_date {
        Ok(current_streak + 1)
    } else {
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("studysentry.sqlite3")).unwrap();
        (dir, db)
    }

    fn focus_session(user_id: &str, duration_seconds: u64, completed_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            duration_seconds,
            completed_at,
            session_type: SessionType::Focus,
            distraction_count: 0,
            was_completed: true,
            created_at: completed_at,
        }
    }

    #[tokio::test]
    async fn create_session_updates_profile_aggregates() {
        let (_dir, db) = test_db();
        db.ensure_profile("u1", Some("Sam")).await.unwrap();

        db.create_session(&focus_session("u1", 1500, Utc::now()))
            .await
            .unwrap();
        db.create_session(&focus_session("u1", 900, Utc::now()))
            .await
            .unwrap();

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.total_study_seconds, 2400);
        assert_eq!(profile.total_sessions, 2);
        assert_eq!(profile.current_streak, 1);
    }

    #[tokio::test]
    async fn break_sessions_do_not_touch_aggregates() {
        let (_dir, db) = test_db();
        db.ensure_profile("u1", None).await.unwrap();

        let mut record = focus_session("u1", 300, Utc::now());
        record.session_type = SessionType::ShortBreak;
        db.create_session(&record).await.unwrap();

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.total_study_seconds, 0);
        assert_eq!(profile.total_sessions, 0);
    }

    #[tokio::test]
    async fn streak_extends_on_consecutive_days_and_resets_on_gaps() {
        let (_dir, db) = test_db();
        db.ensure_profile("u1", None).await.unwrap();

        let day = |d: u32| Utc.with_ymd_and_hms(2026, 3, d, 12, 0, 0).unwrap();

        db.create_session(&focus_session("u1", 600, day(1))).await.unwrap();
        db.create_session(&focus_session("u1", 600, day(2))).await.unwrap();
        db.create_session(&focus_session("u1", 600, day(2))).await.unwrap();
        db.create_session(&focus_session("u1", 600, day(3))).await.unwrap();

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.current_streak, 3);
        assert_eq!(profile.longest_streak, 3);

        db.create_session(&focus_session("u1", 600, day(10))).await.unwrap();
        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.current_streak, 1);
        assert_eq!(profile.longest_streak, 3);
    }

    #[tokio::test]
    async fn stats_split_today_from_lifetime() {
        let (_dir, db) = test_db();
        db.ensure_profile("u1", None).await.unwrap();

        let now = Utc::now();
        db.create_session(&focus_session("u1", 1500, now)).await.unwrap();
        db.create_session(&focus_session("u1", 300, now - Days::new(3)))
            .await
            .unwrap();
        db.create_session(&focus_session("u1", 600, now - Days::new(60)))
            .await
            .unwrap();

        let stats = db.get_user_stats("u1").await.unwrap();
        assert_eq!(stats.today_minutes, 25);
        assert_eq!(stats.today_sessions, 1);
        assert_eq!(stats.week_minutes, 30);
        assert_eq!(stats.month_minutes, 30);
        assert_eq!(stats.total_minutes, 40);
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.average_session_length, 13);
        assert_eq!(stats.streak, 1);
    }

    #[tokio::test]
    async fn stats_for_unknown_user_are_zero() {
        let (_dir, db) = test_db();
        let stats = db.get_user_stats("nobody").await.unwrap();
        assert_eq!(stats.total_minutes, 0);
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.streak, 0);
    }

    #[tokio::test]
    async fn leaderboard_orders_by_study_time_with_ranks() {
        let (_dir, db) = test_db();
        for (user, name, seconds) in [
            ("u1", Some("Ada"), 3600u64),
            ("u2", None, 7200),
            ("u3", Some("Lin"), 1800),
        ] {
            db.ensure_profile(user, name).await.unwrap();
            db.create_session(&focus_session(user, seconds, Utc::now()))
                .await
                .unwrap();
        }

        let board = db.get_leaderboard(10).await.unwrap();
        assert_eq!(board.len(), 3);
        assert_eq!(board[0].display_name, "Anonymous");
        assert_eq!(board[0].total_study_minutes, 120);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].display_name, "Ada");
        assert_eq!(board[1].rank, 2);
        assert_eq!(board[2].display_name, "Lin");
        assert_eq!(board[2].rank, 3);

        let board = db.get_leaderboard(2).await.unwrap();
        assert_eq!(board.len(), 2);
    }

    #[tokio::test]
    async fn rank_counts_strictly_greater_totals() {
        let (_dir, db) = test_db();
        for (user, seconds) in [("u1", 3600u64), ("u2", 7200), ("u3", 3600)] {
            db.ensure_profile(user, None).await.unwrap();
            db.create_session(&focus_session(user, seconds, Utc::now()))
                .await
                .unwrap();
        }

        assert_eq!(db.get_user_rank("u2").await.unwrap(), 1);
        // u1 and u3 tie: only u2 is strictly ahead of either.
        assert_eq!(db.get_user_rank("u1").await.unwrap(), 2);
        assert_eq!(db.get_user_rank("u3").await.unwrap(), 2);
        assert_eq!(db.get_user_rank("ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recent_sessions_come_back_newest_first() {
        let (_dir, db) = test_db();
        db.ensure_profile("u1", None).await.unwrap();

        let now = Utc::now();
        for age_days in [2u64, 0, 1] {
            db.create_session(&focus_session("u1", 600, now - Days::new(age_days)))
                .await
                .unwrap();
        }

        let sessions = db.list_recent_sessions("u1", 10).await.unwrap();
        assert_eq!(sessions.len(), 3);
        assert!(sessions[0].completed_at > sessions[1].completed_at);
        assert!(sessions[1].completed_at > sessions[2].completed_at);

        let sessions = db.list_recent_sessions("u1", 2).await.unwrap();
        assert_eq!(sessions.len(), 2);
    }
}
