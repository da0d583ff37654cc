//! Filter criteria for report rows and deals
//!
//! Every set field must hold (AND). Ranges are inclusive on both ends. An
//! inverted login or profit range matches nothing, while an inverted date
//! window is rejected up front. Group names match exactly unless the pattern
//! contains `*`.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::assembler::{ReportRow, UserAccountSnapshot};
use crate::deals::RawDeal;
use crate::error::ReportError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub groups: Option<BTreeSet<String>>,
    pub min_login: Option<u64>,
    pub max_login: Option<u64>,
    /// Bounds on Net P/L
    pub min_profit: Option<Decimal>,
    pub max_profit: Option<Decimal>,
    pub agent: Option<String>,
    pub zip: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub excluded_logins: BTreeSet<u64>,
}

#[derive(Debug, Clone)]
enum GroupPattern {
    Exact(String),
    Wildcard(Regex),
}

impl GroupPattern {
    fn parse(pattern: &str) -> Result<Self, ReportError> {
        if pattern.trim().is_empty() {
            return Err(ReportError::Validation("empty group name".to_string()));
        }
        if !pattern.contains('*') {
            return Ok(GroupPattern::Exact(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("^{}$", body))
            .map(GroupPattern::Wildcard)
            .map_err(|e| ReportError::Validation(format!("bad group pattern '{}': {}", pattern, e)))
    }

    fn matches(&self, group: &str) -> bool {
        match self {
            GroupPattern::Exact(name) => name == group,
            GroupPattern::Wildcard(re) => re.is_match(group),
        }
    }
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn in_range<T: PartialOrd>(value: T, min: Option<T>, max: Option<T>) -> bool {
    min.is_none_or(|lo| value >= lo) && max.is_none_or(|hi| value <= hi)
}

impl FilterCriteria {
    /// Checked before any query is issued
    pub fn validate(&self, today: NaiveDate) -> Result<(), ReportError> {
        self.window(today)?;
        self.compile().map(|_| ())
    }

    pub fn compile(&self) -> Result<RowFilter<'_>, ReportError> {
        let groups = self
            .groups
            .as_ref()
            .map(|set| {
                set.iter()
                    .map(|g| GroupPattern::parse(g))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        Ok(RowFilter {
            criteria: self,
            groups,
        })
    }

    /// Keep the rows that satisfy every set criterion
    pub fn apply(&self, rows: Vec<ReportRow>) -> Result<Vec<ReportRow>, ReportError> {
        let filter = self.compile()?;
        Ok(rows.into_iter().filter(|r| filter.matches_row(r)).collect())
    }

    /// Report window. Defaults to the first of the current month through today.
    /// An inverted effective window is rejected, including a start date after
    /// today when no end date is set.
    pub fn window(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), ReportError> {
        let end = self.end_date.unwrap_or(today);
        let start = self.start_date.unwrap_or_else(|| month_start(end));
        if start > end {
            return Err(ReportError::Validation(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        Ok((start, end))
    }

    /// Group names usable in a SQL `IN (...)`, when no wildcard is involved
    pub fn exact_groups(&self) -> Option<Vec<&str>> {
        let groups = self.groups.as_ref()?;
        if groups.iter().any(|g| g.contains('*')) {
            return None;
        }
        Some(groups.iter().map(String::as_str).collect())
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        *self == FilterCriteria::default()
    }

    /// One-line human summary of the set criteria
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();

        if let Some(groups) = &self.groups {
            parts.push(format!(
                "groups: {}",
                groups.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        match (self.min_login, self.max_login) {
            (Some(lo), Some(hi)) => parts.push(format!("logins {}..={}", lo, hi)),
            (Some(lo), None) => parts.push(format!("logins >= {}", lo)),
            (None, Some(hi)) => parts.push(format!("logins <= {}", hi)),
            (None, None) => {}
        }
        match (self.min_profit, self.max_profit) {
            (Some(lo), Some(hi)) => parts.push(format!("net P/L {}..={}", lo, hi)),
            (Some(lo), None) => parts.push(format!("net P/L >= {}", lo)),
            (None, Some(hi)) => parts.push(format!("net P/L <= {}", hi)),
            (None, None) => {}
        }
        if let Some(agent) = &self.agent {
            parts.push(format!("agent {}", agent));
        }
        if let Some(zip) = &self.zip {
            parts.push(format!("zip {}", zip));
        }
        if !self.excluded_logins.is_empty() {
            parts.push(format!("{} excluded logins", self.excluded_logins.len()));
        }

        if parts.is_empty() {
            "no filters".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Criteria with group patterns compiled once
#[derive(Debug, Clone)]
pub struct RowFilter<'a> {
    criteria: &'a FilterCriteria,
    groups: Option<Vec<GroupPattern>>,
}

impl RowFilter<'_> {
    fn login_allowed(&self, login: u64) -> bool {
        let c = self.criteria;
        in_range(login, c.min_login, c.max_login) && !c.excluded_logins.contains(&login)
    }

    fn date_allowed(&self, date: NaiveDate) -> bool {
        in_range(date, self.criteria.start_date, self.criteria.end_date)
    }

    pub fn matches_group(&self, group: &str) -> bool {
        self.groups
            .as_ref()
            .is_none_or(|patterns| patterns.iter().any(|p| p.matches(group)))
    }

    pub fn matches_snapshot(&self, snapshot: &UserAccountSnapshot) -> bool {
        let c = self.criteria;
        self.login_allowed(snapshot.login)
            && self.matches_group(&snapshot.group)
            && self.date_allowed(snapshot.date)
            && c.agent
                .as_ref()
                .is_none_or(|a| snapshot.agent.as_ref() == Some(a))
            && c.zip.as_ref().is_none_or(|z| snapshot.zip.as_ref() == Some(z))
    }

    pub fn matches_row(&self, row: &ReportRow) -> bool {
        let c = self.criteria;
        self.matches_snapshot(&row.snapshot) && in_range(row.net_pl, c.min_profit, c.max_profit)
    }

    /// Pre-filter applied before categorization. Rows without a login or
    /// time pass through so the categorizer counts them as skipped.
    pub fn matches_raw(&self, deal: &RawDeal) -> bool {
        let (Some(login), Some(time)) = (deal.login, deal.time) else {
            return true;
        };
        let c = self.criteria;
        self.login_allowed(login)
            && self.date_allowed(time.date())
            && c.agent.as_ref().is_none_or(|a| deal.agent.as_ref() == Some(a))
            && c.zip.as_ref().is_none_or(|z| deal.zip.as_ref() == Some(z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests::snapshot;
    use crate::categorizer::CategoryTotals;
    use rust_decimal_macros::dec;

    fn row(login: u64, group: &str, net: Decimal) -> ReportRow {
        let mut snap = snapshot(login, dec!(0), net);
        snap.group = group.to_string();
        ReportRow::new(snap, CategoryTotals::default())
    }

    fn sample_rows() -> Vec<ReportRow> {
        vec![
            row(10_001, "real\\standard", dec!(150)),
            row(10_002, "real\\vip", dec!(-75)),
            row(10_003, "demo\\standard", dec!(4000)),
            row(10_004, "real\\standard-usd", dec!(20)),
        ]
    }

    fn groups(names: &[&str]) -> Option<BTreeSet<String>> {
        Some(names.iter().map(|n| n.to_string()).collect())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 31).unwrap()
    }

    fn logins(rows: &[ReportRow]) -> Vec<u64> {
        rows.iter().map(ReportRow::login).collect()
    }

    #[test]
    fn test_empty_criteria_keeps_everything() {
        let criteria = FilterCriteria::default();
        assert!(criteria.is_empty());
        assert_eq!(criteria.apply(sample_rows()).unwrap().len(), 4);
        assert_eq!(criteria.describe(), "no filters");
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let criteria = FilterCriteria {
            groups: groups(&["real\\*"]),
            min_profit: Some(dec!(0)),
            ..Default::default()
        };
        let once = criteria.apply(sample_rows()).unwrap();
        let twice = criteria.apply(once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(logins(&once), vec![10_001, 10_004]);
    }

    #[test]
    fn test_inverted_profit_range_is_empty_not_error() {
        let criteria = FilterCriteria {
            min_profit: Some(dec!(5000)),
            max_profit: Some(dec!(100)),
            ..Default::default()
        };
        assert!(criteria.validate(today()).is_ok());
        assert!(criteria.apply(sample_rows()).unwrap().is_empty());
    }

    #[test]
    fn test_inverted_login_range_is_empty() {
        let criteria = FilterCriteria {
            min_login: Some(10_003),
            max_login: Some(10_001),
            ..Default::default()
        };
        assert!(criteria.apply(sample_rows()).unwrap().is_empty());
    }

    #[test]
    fn test_group_exact_match_is_not_substring() {
        let criteria = FilterCriteria {
            groups: groups(&["real\\standard"]),
            ..Default::default()
        };
        assert_eq!(logins(&criteria.apply(sample_rows()).unwrap()), vec![10_001]);
        assert_eq!(criteria.exact_groups(), Some(vec!["real\\standard"]));
    }

    #[test]
    fn test_group_wildcard_treats_rest_literally() {
        let criteria = FilterCriteria {
            groups: groups(&["*standard*"]),
            ..Default::default()
        };
        assert_eq!(
            logins(&criteria.apply(sample_rows()).unwrap()),
            vec![10_001, 10_003, 10_004]
        );
        assert!(criteria.exact_groups().is_none());

        let dotted = FilterCriteria {
            groups: groups(&["real.vip*"]),
            ..Default::default()
        };
        assert!(dotted.apply(sample_rows()).unwrap().is_empty());
    }

    #[test]
    fn test_criteria_are_conjunctive() {
        let criteria = FilterCriteria {
            groups: groups(&["real\\*"]),
            min_login: Some(10_002),
            max_profit: Some(dec!(100)),
            ..Default::default()
        };
        assert_eq!(logins(&criteria.apply(sample_rows()).unwrap()), vec![10_002, 10_004]);
    }

    #[test]
    fn test_agent_zip_and_exclusions() {
        let mut rows = sample_rows();
        rows[1].snapshot.agent = Some("777".to_string());
        rows[2].snapshot.zip = None;

        let by_agent = FilterCriteria {
            agent: Some("501".to_string()),
            ..Default::default()
        };
        assert_eq!(logins(&by_agent.apply(rows.clone()).unwrap()), vec![10_001, 10_003, 10_004]);

        let by_zip = FilterCriteria {
            zip: Some("10115".to_string()),
            excluded_logins: [10_004].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(logins(&by_zip.apply(rows).unwrap()), vec![10_001, 10_002]);
    }

    #[test]
    fn test_validate_rejects_inverted_dates_and_empty_groups() {
        let dates = FilterCriteria {
            start_date: NaiveDate::from_ymd_opt(2025, 8, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 7, 1),
            ..Default::default()
        };
        assert!(matches!(dates.validate(today()), Err(ReportError::Validation(_))));

        let blank = FilterCriteria {
            groups: groups(&["  "]),
            ..Default::default()
        };
        assert!(matches!(blank.validate(today()), Err(ReportError::Validation(_))));
    }

    #[test]
    fn test_open_start_after_today_is_rejected() {
        let future = FilterCriteria {
            start_date: NaiveDate::from_ymd_opt(2025, 8, 10),
            ..Default::default()
        };
        assert!(matches!(future.validate(today()), Err(ReportError::Validation(_))));
        assert!(future.window(today()).is_err());

        // Same start is fine once the end date is after it
        let bounded = FilterCriteria {
            end_date: NaiveDate::from_ymd_opt(2025, 8, 31),
            ..future
        };
        assert!(bounded.validate(today()).is_ok());
    }

    #[test]
    fn test_default_window_is_month_to_date() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 18).unwrap();
        let (start, end) = FilterCriteria::default().window(today).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        assert_eq!(end, today);

        let explicit = FilterCriteria {
            end_date: NaiveDate::from_ymd_opt(2025, 3, 10),
            ..Default::default()
        };
        assert_eq!(
            explicit.window(today).unwrap().0,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_deal_prefilter_uses_login_and_dates() {
        let criteria = FilterCriteria {
            min_login: Some(10_001),
            start_date: NaiveDate::from_ymd_opt(2025, 7, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 7, 31),
            excluded_logins: [10_005].into_iter().collect(),
            ..Default::default()
        };
        let filter = criteria.compile().unwrap();
        let mut deal = RawDeal {
            id: 1,
            login: Some(10_002),
            time: NaiveDate::from_ymd_opt(2025, 7, 31)
                .and_then(|d| d.and_hms_opt(23, 59, 59)),
            amount: Some(dec!(10)),
            action: Some(2),
            ..Default::default()
        };
        assert!(filter.matches_raw(&deal));

        deal.login = Some(10_005);
        assert!(!filter.matches_raw(&deal));

        // Left for the categorizer to count
        deal.login = None;
        assert!(filter.matches_raw(&deal));
    }
}
