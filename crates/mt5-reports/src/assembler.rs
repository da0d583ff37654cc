//! Joins account snapshots with per-login deal totals
//!
//! Produces one `ReportRow` per snapshot, derives Equity P/L and Net P/L,
//! and sorts by Net P/L with login as the tie-breaker.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::categorizer::{CategorizedDeals, CategoryTotals};
use crate::deals::Category;

/// Account state at the report date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAccountSnapshot {
    pub login: u64,
    pub name: String,
    pub group: String,
    pub currency: String,
    pub agent: Option<String>,
    pub zip: Option<String>,
    pub balance: Decimal,
    /// Equity at the start of the period (MT5 `EquityPrevMonth`)
    pub previous_equity: Decimal,
    /// Equity at the report date (MT5 `EquityPrevDay`)
    pub current_equity: Decimal,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub snapshot: UserAccountSnapshot,
    pub totals: CategoryTotals,
    pub equity_pl: Decimal,
    pub net_pl: Decimal,
}

impl ReportRow {
    /// Net P/L = equity change - deposits - withdrawals. Withdrawals are
    /// stored negative, so they add back.
    pub fn new(snapshot: UserAccountSnapshot, totals: CategoryTotals) -> Self {
        let equity_pl = snapshot.current_equity - snapshot.previous_equity;
        let net_pl =
            equity_pl - totals.sum(Category::Deposit) - totals.sum(Category::Withdrawal);

        Self {
            snapshot,
            totals,
            equity_pl,
            net_pl,
        }
    }

    pub fn login(&self) -> u64 {
        self.snapshot.login
    }

    pub fn deposits(&self) -> Decimal {
        self.totals.sum(Category::Deposit)
    }

    pub fn withdrawals(&self) -> Decimal {
        self.totals.sum(Category::Withdrawal)
    }

    pub fn promotions(&self) -> Decimal {
        self.totals.sum(Category::Promotion)
    }

    pub fn credits(&self) -> Decimal {
        self.totals.sum(Category::Credit)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::Ascending => write!(f, "Net P/L ascending"),
            SortOrder::Descending => write!(f, "Net P/L descending"),
        }
    }
}

/// One row per snapshot; logins without deals get zero-filled totals
pub fn assemble(
    snapshots: Vec<UserAccountSnapshot>,
    categorized: &CategorizedDeals,
) -> Vec<ReportRow> {
    snapshots
        .into_iter()
        .map(|snapshot| {
            let totals = categorized.login_totals(snapshot.login);
            ReportRow::new(snapshot, totals)
        })
        .collect()
}

pub fn sort_rows(rows: &mut [ReportRow], order: SortOrder) {
    rows.sort_by(|a, b| {
        let by_pl = a.net_pl.cmp(&b.net_pl);
        let by_pl = match order {
            SortOrder::Ascending => by_pl,
            SortOrder::Descending => by_pl.reverse(),
        };
        by_pl.then_with(|| a.login().cmp(&b.login()))
    });
}

/// Column totals across a set of rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub accounts: usize,
    pub balance: Decimal,
    pub current_equity: Decimal,
    pub deposits: Decimal,
    pub withdrawals: Decimal,
    pub promotions: Decimal,
    pub credits: Decimal,
    pub equity_pl: Decimal,
    pub net_pl: Decimal,
    pub profitable: usize,
    pub losing: usize,
}

impl ReportSummary {
    pub fn from_rows(rows: &[ReportRow]) -> Self {
        rows.iter().fold(Self::default(), |mut s, row| {
            s.accounts += 1;
            s.balance += row.snapshot.balance;
            s.current_equity += row.snapshot.current_equity;
            s.deposits += row.deposits();
            s.withdrawals += row.withdrawals();
            s.promotions += row.promotions();
            s.credits += row.credits();
            s.equity_pl += row.equity_pl;
            s.net_pl += row.net_pl;
            if row.net_pl > Decimal::ZERO {
                s.profitable += 1;
            } else if row.net_pl < Decimal::ZERO {
                s.losing += 1;
            }
            s
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::categorizer::Classifier;
    use crate::deals::{Deal, PeriodGranularity};
    use rust_decimal_macros::dec;

    pub(crate) fn snapshot(login: u64, previous: Decimal, current: Decimal) -> UserAccountSnapshot {
        UserAccountSnapshot {
            login,
            name: format!("Client {}", login),
            group: "real\\standard".to_string(),
            currency: "USD".to_string(),
            agent: Some("501".to_string()),
            zip: Some("10115".to_string()),
            balance: current,
            previous_equity: previous,
            current_equity: current,
            date: NaiveDate::from_ymd_opt(2025, 7, 31).unwrap(),
        }
    }

    fn row_with_net(login: u64, net: Decimal) -> ReportRow {
        ReportRow::new(snapshot(login, dec!(0), net), CategoryTotals::default())
    }

    fn deal(id: u64, login: u64, amount: Decimal, comment: &str) -> Deal {
        Deal {
            id,
            login,
            time: NaiveDate::from_ymd_opt(2025, 7, 15)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            amount,
            action: Some(2),
            comment: comment.to_string(),
            currency: None,
            agent: None,
            zip: None,
        }
    }

    #[test]
    fn test_snapshot_without_deals_is_zero_filled() {
        let categorized = CategorizedDeals::default();
        let rows = assemble(vec![snapshot(10_001, dec!(1000), dec!(1250))], &categorized);

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        for category in Category::ALL {
            let aggregate = row.totals.get(category);
            assert_eq!(aggregate.count, 0);
            assert_eq!(aggregate.sum, dec!(0));
            assert_eq!(aggregate.average(), dec!(0));
        }
        assert_eq!(row.equity_pl, dec!(250));
        assert_eq!(row.net_pl, dec!(250));
    }

    #[test]
    fn test_net_pl_removes_cash_flow() {
        let categorized = Classifier::default().categorize_deals(
            vec![
                deal(1, 10_001, dec!(500), "DT-1"),
                deal(2, 10_001, dec!(-200), "WT-1"),
                deal(3, 10_001, dec!(50), "bonus"),
            ],
            PeriodGranularity::Month,
        );

        let rows = assemble(vec![snapshot(10_001, dec!(1000), dec!(1400))], &categorized);

        let row = &rows[0];
        assert_eq!(row.equity_pl, dec!(400));
        // 400 - 500 - (-200)
        assert_eq!(row.net_pl, dec!(100));
        assert_eq!(row.promotions(), dec!(50));
    }

    #[test]
    fn test_descending_reverses_ascending() {
        let mut ascending = vec![
            row_with_net(10_003, dec!(-20)),
            row_with_net(10_001, dec!(75.5)),
            row_with_net(10_002, dec!(10)),
        ];
        let mut descending = ascending.clone();

        sort_rows(&mut ascending, SortOrder::Ascending);
        sort_rows(&mut descending, SortOrder::Descending);

        let logins = |rows: &[ReportRow]| rows.iter().map(ReportRow::login).collect::<Vec<_>>();
        assert_eq!(logins(&ascending), vec![10_003, 10_002, 10_001]);
        let mut reversed = logins(&descending);
        reversed.reverse();
        assert_eq!(reversed, logins(&ascending));
    }

    #[test]
    fn test_ties_break_by_login_in_both_orders() {
        let rows = vec![
            row_with_net(10_009, dec!(5)),
            row_with_net(10_002, dec!(5)),
            row_with_net(10_005, dec!(-1)),
        ];

        let mut ascending = rows.clone();
        sort_rows(&mut ascending, SortOrder::Ascending);
        let mut descending = rows;
        sort_rows(&mut descending, SortOrder::Descending);

        let logins = |rows: &[ReportRow]| rows.iter().map(ReportRow::login).collect::<Vec<_>>();
        assert_eq!(logins(&ascending), vec![10_005, 10_002, 10_009]);
        assert_eq!(logins(&descending), vec![10_002, 10_009, 10_005]);
    }

    #[test]
    fn test_summary_totals() {
        let rows = vec![
            row_with_net(10_001, dec!(100)),
            row_with_net(10_002, dec!(-40)),
            row_with_net(10_003, dec!(0)),
        ];
        let summary = ReportSummary::from_rows(&rows);
        assert_eq!(summary.accounts, 3);
        assert_eq!(summary.net_pl, dec!(60));
        assert_eq!(summary.profitable, 1);
        assert_eq!(summary.losing, 1);
    }
}
