//! Deal records, the closed category set, and reporting periods

use chrono::{Datelike, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single trading or cash-flow deal, validated and immutable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deal {
    pub id: u64,
    pub login: u64,
    pub time: NaiveDateTime,
    /// Signed amount (MT5 `Profit` column); withdrawals are negative
    pub amount: Decimal,
    /// MT5 deal action code, when known
    pub action: Option<u32>,
    pub comment: String,
    pub currency: Option<String>,
    pub agent: Option<String>,
    pub zip: Option<String>,
}

/// Deal row as read from the source; login and time may be missing
#[derive(Debug, Clone, Default)]
pub struct RawDeal {
    pub id: u64,
    pub login: Option<u64>,
    pub time: Option<NaiveDateTime>,
    pub amount: Option<Decimal>,
    pub action: Option<u32>,
    pub comment: Option<String>,
    pub currency: Option<String>,
    pub agent: Option<String>,
    pub zip: Option<String>,
}

impl RawDeal {
    /// Validate required fields. A missing amount counts as zero.
    pub fn into_deal(self) -> Option<Deal> {
        Some(Deal {
            id: self.id,
            login: self.login?,
            time: self.time?,
            amount: self.amount.unwrap_or_default(),
            action: self.action,
            comment: self.comment.unwrap_or_default(),
            currency: self.currency,
            agent: self.agent,
            zip: self.zip,
        })
    }
}

/// Split raw rows into valid deals and a count of skipped rows
pub fn partition_raw(raws: impl IntoIterator<Item = RawDeal>) -> (Vec<Deal>, usize) {
    let mut deals = Vec::new();
    let mut skipped = 0;

    for raw in raws {
        match raw.into_deal() {
            Some(deal) => deals.push(deal),
            None => skipped += 1,
        }
    }

    (deals, skipped)
}

/// Deal category
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Category {
    Deposit,
    Withdrawal,
    Promotion,
    Credit,
    Trade,
    Unclassified,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Deposit,
        Category::Withdrawal,
        Category::Promotion,
        Category::Credit,
        Category::Trade,
        Category::Unclassified,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Deposit => write!(f, "Deposit"),
            Category::Withdrawal => write!(f, "Withdrawal"),
            Category::Promotion => write!(f, "Promotion"),
            Category::Credit => write!(f, "Credit"),
            Category::Trade => write!(f, "Trade"),
            Category::Unclassified => write!(f, "Unclassified"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Calendar bucket size for aggregation
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PeriodGranularity {
    #[default]
    Month,
    Year,
}

/// Calendar period a deal falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Period {
    Month { year: i32, month: u32 },
    Year(i32),
}

impl Period {
    pub fn of(time: &NaiveDateTime, granularity: PeriodGranularity) -> Self {
        match granularity {
            PeriodGranularity::Month => Period::Month {
                year: time.year(),
                month: time.month(),
            },
            PeriodGranularity::Year => Period::Year(time.year()),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::Month { year, month } => write!(f, "{}-{:02}", year, month),
            Period::Year(year) => write!(f, "{}", year),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_into_deal_requires_login_and_time() {
        let missing_login = RawDeal {
            id: 1,
            time: Some(at(2025, 7, 1)),
            ..Default::default()
        };
        let missing_time = RawDeal {
            id: 2,
            login: Some(10_001),
            ..Default::default()
        };
        assert!(missing_login.into_deal().is_none());
        assert!(missing_time.into_deal().is_none());
    }

    #[test]
    fn test_into_deal_defaults_amount_and_comment() {
        let deal = RawDeal {
            id: 3,
            login: Some(10_001),
            time: Some(at(2025, 7, 1)),
            ..Default::default()
        }
        .into_deal()
        .unwrap();
        assert_eq!(deal.amount, dec!(0));
        assert_eq!(deal.comment, "");
    }

    #[test]
    fn test_partition_raw_counts_skipped() {
        let raws = vec![
            RawDeal {
                id: 1,
                login: Some(10_001),
                time: Some(at(2025, 7, 1)),
                amount: Some(dec!(100)),
                ..Default::default()
            },
            RawDeal {
                id: 2,
                login: None,
                time: Some(at(2025, 7, 2)),
                ..Default::default()
            },
        ];
        let (deals, skipped) = partition_raw(raws);
        assert_eq!(deals.len(), 1);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_category_round_trips_through_name() {
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>(), Ok(category));
        }
        assert_eq!("withdrawal".parse::<Category>(), Ok(Category::Withdrawal));
        assert!("refund".parse::<Category>().is_err());
    }

    #[test]
    fn test_period_display() {
        let time = at(2025, 3, 9);
        assert_eq!(Period::of(&time, PeriodGranularity::Month).to_string(), "2025-03");
        assert_eq!(Period::of(&time, PeriodGranularity::Year).to_string(), "2025");
    }
}
