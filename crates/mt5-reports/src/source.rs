//! Record source over the MT5 MySQL schema
//!
//! Daily account state lives in year-partitioned `mt5_daily_<year>` tables
//! keyed by a unix `Datetime`; deals live in `mt5_deals_<year>` with a
//! DATETIME `Time` column. Agent and ZIP come from `mt5_users`.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder};
use std::time::Duration;
use tracing::{debug, warn};

use crate::assembler::UserAccountSnapshot;
use crate::config::DatabaseConfig;
use crate::constants;
use crate::deals::RawDeal;
use crate::error::ReportError;
use crate::filters::FilterCriteria;

/// Snapshot selection pushed down to the source
#[derive(Debug, Clone)]
pub struct SnapshotQuery {
    pub date: NaiveDate,
    /// Exact group names only; wildcards are matched in memory
    pub groups: Option<Vec<String>>,
    pub min_login: Option<u64>,
    pub max_login: Option<u64>,
    pub agent: Option<String>,
    pub zip: Option<String>,
}

impl SnapshotQuery {
    pub fn new(date: NaiveDate, criteria: &FilterCriteria) -> Self {
        Self {
            date,
            groups: criteria
                .exact_groups()
                .map(|groups| groups.into_iter().map(str::to_string).collect()),
            min_login: criteria.min_login,
            max_login: criteria.max_login,
            agent: criteria.agent.clone(),
            zip: criteria.zip.clone(),
        }
    }
}

/// Deal selection pushed down to the source
#[derive(Debug, Clone)]
pub struct DealQuery {
    /// Inclusive date range
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Restrict to these logins; None means every login above the floor
    pub logins: Option<Vec<u64>>,
    pub min_login: Option<u64>,
    pub max_login: Option<u64>,
    pub actions: Vec<u32>,
}

impl DealQuery {
    pub fn new(start: NaiveDate, end: NaiveDate, include_trades: bool) -> Self {
        let mut actions = constants::CASH_FLOW_ACTIONS.to_vec();
        if include_trades {
            actions.extend(constants::TRADE_ACTIONS);
        }
        Self {
            start,
            end,
            logins: None,
            min_login: None,
            max_login: None,
            actions,
        }
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start.year()..=self.end.year()
    }
}

/// Supplies snapshots and raw deals for a report run
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Latest date with account snapshots inside the window
    async fn latest_snapshot_date(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<NaiveDate>, ReportError>;

    async fn fetch_snapshots(
        &self,
        query: &SnapshotQuery,
    ) -> Result<Vec<UserAccountSnapshot>, ReportError>;

    async fn fetch_deals(&self, query: &DealQuery) -> Result<Vec<RawDeal>, ReportError>;
}

// =============================================================================
// MySQL
// =============================================================================

/// Row type for the daily snapshot query
#[derive(FromRow)]
struct SnapshotRow {
    login: i64,
    name: Option<String>,
    group_name: Option<String>,
    currency: Option<String>,
    balance: Option<Decimal>,
    equity_prev_day: Option<Decimal>,
    equity_prev_month: Option<Decimal>,
    report_ts: i64,
    agent: Option<String>,
    zip: Option<String>,
}

/// Row type for the deals query
#[derive(FromRow)]
struct DealRow {
    deal: i64,
    login: Option<i64>,
    time: Option<NaiveDateTime>,
    profit: Option<Decimal>,
    action: Option<i64>,
    comment: Option<String>,
    agent: Option<String>,
    zip: Option<String>,
}

/// Group name with its account count
#[derive(Debug, Clone, FromRow)]
pub struct GroupCount {
    pub group_name: String,
    pub accounts: i64,
}

/// Distinct balance comment with its frequency
#[derive(Debug, Clone, FromRow)]
pub struct CommentSample {
    pub comment: String,
    pub occurrences: i64,
}

const SNAPSHOT_COLUMNS: &str = "
    CAST(d.Login AS SIGNED) AS login,
    d.Name AS name,
    d.`Group` AS group_name,
    d.Currency AS currency,
    CAST(d.Balance AS DECIMAL(20,4)) AS balance,
    CAST(d.EquityPrevDay AS DECIMAL(20,4)) AS equity_prev_day,
    CAST(d.EquityPrevMonth AS DECIMAL(20,4)) AS equity_prev_month,
    CAST(d.Datetime AS SIGNED) AS report_ts,
    CAST(u.Agent AS CHAR) AS agent,
    u.ZipCode AS zip";

const DEAL_COLUMNS: &str = "
    CAST(d.Deal AS SIGNED) AS deal,
    CAST(d.Login AS SIGNED) AS login,
    d.Time AS time,
    CAST(d.Profit AS DECIMAL(20,4)) AS profit,
    CAST(d.Action AS SIGNED) AS action,
    d.Comment AS comment,
    CAST(u.Agent AS CHAR) AS agent,
    u.ZipCode AS zip";

fn daily_table(year: i32) -> String {
    format!("{}{}", constants::DAILY_TABLE_PREFIX, year)
}

fn deals_table(year: i32) -> String {
    format!("{}{}", constants::DEALS_TABLE_PREFIX, year)
}

/// Daily `Datetime` values are treated as UTC seconds
fn day_start_ts(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn ts_to_date(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

/// MySQL ER_NO_SUCH_TABLE; a year with no partition yet
fn is_missing_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("42S02"),
        _ => false,
    }
}

fn to_login(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

/// MT5 MySQL database
pub struct MySqlSource {
    pool: MySqlPool,
    name: String,
    login_floor: u64,
    max_logins_per_query: usize,
}

impl MySqlSource {
    /// Connect to a named database target
    pub async fn connect(
        name: &str,
        db: &DatabaseConfig,
        login_floor: u64,
        max_logins_per_query: usize,
    ) -> Result<Self, ReportError> {
        let options = MySqlConnectOptions::new()
            .host(&db.host)
            .port(db.port)
            .username(&db.user)
            .password(&db.password)
            .database(&db.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|source| ReportError::Connection {
                target: name.to_string(),
                source,
            })?;

        debug!(database = %name, target = %db.describe(), "connected");

        Ok(Self {
            pool,
            name: name.to_string(),
            login_floor,
            max_logins_per_query: max_logins_per_query.max(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn floor(&self) -> i64 {
        i64::try_from(self.login_floor).unwrap_or(i64::MAX)
    }

    /// Groups present in the daily table for a year
    pub async fn available_groups(&self, year: i32) -> Result<Vec<GroupCount>, ReportError> {
        let sql = format!(
            "SELECT d.`Group` AS group_name, COUNT(DISTINCT d.Login) AS accounts
             FROM {} d
             WHERE d.Login > ? AND d.`Group` IS NOT NULL
             GROUP BY d.`Group`
             ORDER BY d.`Group`",
            daily_table(year)
        );
        let groups = sqlx::query_as::<_, GroupCount>(&sql)
            .bind(self.floor())
            .fetch_all(&self.pool)
            .await?;
        Ok(groups)
    }

    /// Lowest and highest client login in the daily table for a year
    pub async fn login_range(&self, year: i32) -> Result<Option<(u64, u64)>, ReportError> {
        let sql = format!(
            "SELECT CAST(MIN(Login) AS SIGNED), CAST(MAX(Login) AS SIGNED)
             FROM {} WHERE Login > ?",
            daily_table(year)
        );
        let (min, max): (Option<i64>, Option<i64>) = sqlx::query_as(&sql)
            .bind(self.floor())
            .fetch_one(&self.pool)
            .await?;

        Ok(min.zip(max).and_then(|(lo, hi)| to_login(lo).zip(to_login(hi))))
    }

    /// Most frequent balance-operation comments in a year
    pub async fn comment_samples(
        &self,
        year: i32,
        limit: u32,
    ) -> Result<Vec<CommentSample>, ReportError> {
        let sql = format!(
            "SELECT COALESCE(Comment, '') AS comment, COUNT(*) AS occurrences
             FROM {}
             WHERE Action = ? AND Login > ?
             GROUP BY COALESCE(Comment, '')
             ORDER BY occurrences DESC
             LIMIT ?",
            deals_table(year)
        );
        let samples = sqlx::query_as::<_, CommentSample>(&sql)
            .bind(i64::from(constants::ACTION_BALANCE))
            .bind(self.floor())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(samples)
    }

    async fn fetch_deals_from(
        &self,
        year: i32,
        query: &DealQuery,
        logins: Option<&[u64]>,
    ) -> Result<Vec<RawDeal>, ReportError> {
        let start = query.start.and_time(NaiveTime::MIN);
        let end = query
            .end
            .succ_opt()
            .unwrap_or(query.end)
            .and_time(NaiveTime::MIN);

        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {} FROM {} d LEFT JOIN {} u ON d.Login = u.Login WHERE d.Time >= ",
            DEAL_COLUMNS,
            deals_table(year),
            constants::USERS_TABLE
        ));
        qb.push_bind(start);
        qb.push(" AND d.Time < ");
        qb.push_bind(end);
        qb.push(" AND d.Login > ");
        qb.push_bind(self.floor());

        if let Some(min) = query.min_login {
            qb.push(" AND d.Login >= ");
            qb.push_bind(min as i64);
        }
        if let Some(max) = query.max_login {
            qb.push(" AND d.Login <= ");
            qb.push_bind(max as i64);
        }

        qb.push(" AND d.Action IN (");
        let mut actions = qb.separated(", ");
        for action in &query.actions {
            actions.push_bind(i64::from(*action));
        }
        actions.push_unseparated(")");

        if let Some(logins) = logins {
            qb.push(" AND d.Login IN (");
            let mut list = qb.separated(", ");
            for login in logins {
                list.push_bind(*login as i64);
            }
            list.push_unseparated(")");
        }

        qb.push(" ORDER BY d.Login, d.Time, d.Deal");

        let rows: Vec<DealRow> = match qb.build_query_as().fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) if is_missing_table(&e) => {
                warn!(table = %deals_table(year), "deals table missing, treating as empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(rows
            .into_iter()
            .map(|row| RawDeal {
                id: u64::try_from(row.deal).unwrap_or_default(),
                login: row.login.and_then(to_login),
                time: row.time,
                amount: row.profit,
                action: row.action.and_then(|a| u32::try_from(a).ok()),
                comment: row.comment,
                currency: None,
                agent: row.agent,
                zip: row.zip,
            })
            .collect())
    }
}

#[async_trait]
impl RecordSource for MySqlSource {
    async fn latest_snapshot_date(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<NaiveDate>, ReportError> {
        let from = day_start_ts(start);
        let until = day_start_ts(end.succ_opt().unwrap_or(end));

        for year in (start.year()..=end.year()).rev() {
            let sql = format!(
                "SELECT CAST(MAX(Datetime) AS SIGNED) FROM {}
                 WHERE Datetime >= ? AND Datetime < ? AND Login > ?",
                daily_table(year)
            );
            let latest: Option<i64> = match sqlx::query_scalar(&sql)
                .bind(from)
                .bind(until)
                .bind(self.floor())
                .fetch_one(&self.pool)
                .await
            {
                Ok(latest) => latest,
                Err(e) if is_missing_table(&e) => None,
                Err(e) => return Err(e.into()),
            };

            if let Some(date) = latest.and_then(ts_to_date) {
                return Ok(Some(date));
            }
        }

        Ok(None)
    }

    async fn fetch_snapshots(
        &self,
        query: &SnapshotQuery,
    ) -> Result<Vec<UserAccountSnapshot>, ReportError> {
        let from = day_start_ts(query.date);
        let until = from + 86_400;

        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {} FROM {} d LEFT JOIN {} u ON d.Login = u.Login WHERE d.Datetime >= ",
            SNAPSHOT_COLUMNS,
            daily_table(query.date.year()),
            constants::USERS_TABLE
        ));
        qb.push_bind(from);
        qb.push(" AND d.Datetime < ");
        qb.push_bind(until);
        qb.push(" AND d.Login > ");
        qb.push_bind(self.floor());

        if let Some(groups) = &query.groups {
            qb.push(" AND d.`Group` IN (");
            let mut list = qb.separated(", ");
            for group in groups {
                list.push_bind(group.clone());
            }
            list.push_unseparated(")");
        }
        if let Some(min) = query.min_login {
            qb.push(" AND d.Login >= ");
            qb.push_bind(min as i64);
        }
        if let Some(max) = query.max_login {
            qb.push(" AND d.Login <= ");
            qb.push_bind(max as i64);
        }
        if let Some(agent) = &query.agent {
            qb.push(" AND CAST(u.Agent AS CHAR) = ");
            qb.push_bind(agent.clone());
        }
        if let Some(zip) = &query.zip {
            qb.push(" AND u.ZipCode = ");
            qb.push_bind(zip.clone());
        }
        qb.push(" ORDER BY d.Login");

        let rows: Vec<SnapshotRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        debug!(date = %query.date, rows = rows.len(), "fetched snapshots");

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(UserAccountSnapshot {
                    login: to_login(row.login)?,
                    name: row.name.unwrap_or_default(),
                    group: row.group_name.unwrap_or_default(),
                    currency: row.currency.unwrap_or_default(),
                    agent: row.agent.filter(|a| !a.is_empty() && a != "0"),
                    zip: row.zip.filter(|z| !z.is_empty()),
                    balance: row.balance.unwrap_or_default(),
                    previous_equity: row.equity_prev_month.unwrap_or_default(),
                    current_equity: row.equity_prev_day.unwrap_or_default(),
                    date: ts_to_date(row.report_ts).unwrap_or(query.date),
                })
            })
            .collect())
    }

    async fn fetch_deals(&self, query: &DealQuery) -> Result<Vec<RawDeal>, ReportError> {
        if query.actions.is_empty() {
            return Ok(Vec::new());
        }

        let mut deals = Vec::new();
        for year in query.years() {
            match &query.logins {
                Some(logins) => {
                    for chunk in logins.chunks(self.max_logins_per_query) {
                        deals.extend(self.fetch_deals_from(year, query, Some(chunk)).await?);
                    }
                }
                None => deals.extend(self.fetch_deals_from(year, query, None).await?),
            }
        }

        debug!(
            database = %self.name,
            start = %query.start,
            end = %query.end,
            deals = deals.len(),
            "fetched deals"
        );
        Ok(deals)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory source applying the same pushdown as the MySQL queries
    #[derive(Default, Clone)]
    pub(crate) struct MemorySource {
        pub snapshots: Vec<UserAccountSnapshot>,
        pub deals: Vec<RawDeal>,
        pub unreachable: bool,
    }

    impl MemorySource {
        fn check(&self) -> Result<(), ReportError> {
            if self.unreachable {
                return Err(ReportError::Connection {
                    target: "memory".to_string(),
                    source: sqlx::Error::PoolTimedOut,
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RecordSource for MemorySource {
        async fn latest_snapshot_date(
            &self,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Option<NaiveDate>, ReportError> {
            self.check()?;
            Ok(self
                .snapshots
                .iter()
                .map(|s| s.date)
                .filter(|d| *d >= start && *d <= end)
                .max())
        }

        async fn fetch_snapshots(
            &self,
            query: &SnapshotQuery,
        ) -> Result<Vec<UserAccountSnapshot>, ReportError> {
            self.check()?;
            Ok(self
                .snapshots
                .iter()
                .filter(|s| s.date == query.date)
                .filter(|s| s.login > constants::LOGIN_FLOOR)
                .filter(|s| {
                    query
                        .groups
                        .as_ref()
                        .is_none_or(|groups| groups.contains(&s.group))
                })
                .cloned()
                .collect())
        }

        async fn fetch_deals(&self, query: &DealQuery) -> Result<Vec<RawDeal>, ReportError> {
            self.check()?;
            Ok(self
                .deals
                .iter()
                .filter(|d| {
                    d.time.is_none_or(|t| t.date() >= query.start && t.date() <= query.end)
                })
                .filter(|d| d.action.is_none_or(|a| query.actions.contains(&a)))
                .filter(|d| match (&query.logins, d.login) {
                    (Some(logins), Some(login)) => logins.contains(&login),
                    _ => true,
                })
                .cloned()
                .collect())
        }
    }

    #[test]
    fn test_day_start_is_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(day_start_ts(date), 1_751_328_000);
        assert_eq!(ts_to_date(1_751_328_000 + 3_600), Some(date));
    }

    #[test]
    fn test_deal_query_spans_years_and_actions() {
        let query = DealQuery::new(
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            false,
        );
        assert_eq!(query.years().collect::<Vec<_>>(), vec![2024, 2025]);
        assert_eq!(query.actions, constants::CASH_FLOW_ACTIONS.to_vec());

        let with_trades = DealQuery::new(query.start, query.end, true);
        assert!(with_trades.actions.contains(&constants::ACTION_BUY));
    }

    #[test]
    fn test_snapshot_query_pushes_exact_groups_only() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let exact = FilterCriteria {
            groups: Some(["real\\a".to_string()].into_iter().collect()),
            agent: Some("501".to_string()),
            ..Default::default()
        };
        let query = SnapshotQuery::new(date, &exact);
        assert_eq!(query.groups, Some(vec!["real\\a".to_string()]));
        assert_eq!(query.agent.as_deref(), Some("501"));

        let wildcard = FilterCriteria {
            groups: Some(["real\\*".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert!(SnapshotQuery::new(date, &wildcard).groups.is_none());
    }

    #[test]
    fn test_table_names() {
        assert_eq!(daily_table(2025), "mt5_daily_2025");
        assert_eq!(deals_table(2024), "mt5_deals_2024");
    }
}
