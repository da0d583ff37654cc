//! Deal classification and per-period aggregation
//!
//! Rules are evaluated in order against the trimmed, upper-cased comment,
//! the MT5 action code and the sign of the amount. The first match wins and
//! anything left over is `Unclassified`, so every deal lands in exactly one
//! bucket.

use chrono::NaiveDateTime;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::constants;
use crate::deals::{self, Category, Deal, Period, PeriodGranularity, RawDeal};
use crate::error::ReportError;

// =============================================================================
// Rules
// =============================================================================

#[derive(Debug, Clone)]
enum Matcher {
    Action(Vec<u32>),
    Prefix(Vec<String>),
    Contains(Vec<String>),
    Pattern(Regex),
    /// Comment holds a bare BUY/SELL action code ("0" or "1")
    TradeCode,
    /// Balance operation with no comment at all
    EmptyBalance,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Fixed(Category),
    BySign {
        non_negative: Category,
        negative: Category,
    },
}

/// A single classification rule
#[derive(Debug, Clone)]
pub struct Rule {
    matcher: Matcher,
    outcome: Outcome,
}

impl Rule {
    fn fixed(matcher: Matcher, category: Category) -> Self {
        Self {
            matcher,
            outcome: Outcome::Fixed(category),
        }
    }

    fn evaluate(&self, deal: &Deal, comment: &str) -> Option<Category> {
        let matched = match &self.matcher {
            Matcher::Action(codes) => deal.action.is_some_and(|a| codes.contains(&a)),
            Matcher::Prefix(prefixes) => prefixes.iter().any(|p| comment.starts_with(p.as_str())),
            Matcher::Contains(needles) => needles.iter().any(|n| comment.contains(n.as_str())),
            Matcher::Pattern(re) => re.is_match(deal.comment.trim()),
            Matcher::TradeCode => comment
                .parse::<u32>()
                .is_ok_and(|code| constants::TRADE_ACTIONS.contains(&code)),
            Matcher::EmptyBalance => {
                deal.action == Some(constants::ACTION_BALANCE) && comment.is_empty()
            }
        };

        if !matched {
            return None;
        }

        Some(match self.outcome {
            Outcome::Fixed(category) => category,
            Outcome::BySign {
                non_negative,
                negative,
            } => {
                if deal.amount < Decimal::ZERO {
                    negative
                } else {
                    non_negative
                }
            }
        })
    }
}

/// Rule kinds accepted in config.toml
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Action,
    Prefix,
    Contains,
    Regex,
}

/// Custom rule declared under `[[classifier.rules]]`
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub kind: RuleKind,
    pub value: String,
    pub category: Category,
}

impl TryFrom<&RuleSpec> for Rule {
    type Error = ReportError;

    fn try_from(spec: &RuleSpec) -> Result<Self, Self::Error> {
        let matcher = match spec.kind {
            RuleKind::Action => {
                let codes = spec
                    .value
                    .split(',')
                    .map(|c| c.trim().parse::<u32>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| {
                        ReportError::Config(format!("invalid action code list '{}'", spec.value))
                    })?;
                Matcher::Action(codes)
            }
            RuleKind::Prefix => Matcher::Prefix(vec![spec.value.trim().to_uppercase()]),
            RuleKind::Contains => Matcher::Contains(vec![spec.value.trim().to_uppercase()]),
            RuleKind::Regex => Matcher::Pattern(Regex::new(&spec.value).map_err(|e| {
                ReportError::Config(format!("invalid rule regex '{}': {}", spec.value, e))
            })?),
        };

        if spec.value.trim().is_empty() {
            return Err(ReportError::Config(format!(
                "empty {:?} rule for {}",
                spec.kind, spec.category
            )));
        }

        Ok(Rule::fixed(matcher, spec.category))
    }
}

fn words(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Built-in rule order. Cancellations are checked before the plain DT/WT
/// prefixes because "CANCELLED WITH..." would otherwise fall through to
/// the generic matches.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::fixed(Matcher::Action(vec![constants::ACTION_CREDIT]), Category::Credit),
        Rule::fixed(Matcher::Action(constants::TRADE_ACTIONS.to_vec()), Category::Trade),
        Rule::fixed(Matcher::Action(vec![constants::ACTION_BONUS]), Category::Promotion),
        Rule::fixed(Matcher::Prefix(words(&["CANCELLED WITH"])), Category::Withdrawal),
        Rule::fixed(Matcher::Prefix(words(&["CANCELLED DEP"])), Category::Deposit),
        Rule {
            matcher: Matcher::Prefix(words(&["CANCELLED"])),
            outcome: Outcome::BySign {
                non_negative: Category::Withdrawal,
                negative: Category::Deposit,
            },
        },
        Rule::fixed(Matcher::Prefix(words(&["DT"])), Category::Deposit),
        Rule::fixed(Matcher::Prefix(words(&["WT", "WITH"])), Category::Withdrawal),
        Rule::fixed(Matcher::Contains(words(&["DEPOSIT"])), Category::Deposit),
        Rule::fixed(Matcher::Contains(words(&["WITHDRAW"])), Category::Withdrawal),
        Rule::fixed(Matcher::Contains(words(&["BONUS", "PROMO"])), Category::Promotion),
        Rule::fixed(Matcher::Contains(words(&["CREDIT"])), Category::Credit),
        Rule::fixed(Matcher::TradeCode, Category::Trade),
        Rule::fixed(Matcher::EmptyBalance, Category::Promotion),
    ]
}

// =============================================================================
// Aggregates
// =============================================================================

/// Running statistics for one (category, period) bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PeriodAggregate {
    pub count: u64,
    pub sum: Decimal,
    /// None until a deal has been recorded
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl PeriodAggregate {
    pub fn record(&mut self, amount: Decimal) {
        self.count += 1;
        self.sum += amount;
        self.min = Some(self.min.map_or(amount, |m| m.min(amount)));
        self.max = Some(self.max.map_or(amount, |m| m.max(amount)));
    }

    /// sum / count, or zero for an empty bucket
    pub fn average(&self) -> Decimal {
        if self.count == 0 {
            Decimal::ZERO
        } else {
            self.sum / Decimal::from(self.count)
        }
    }
}

/// Aggregates for every category, zero-filled
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotals(BTreeMap<Category, PeriodAggregate>);

impl Default for CategoryTotals {
    fn default() -> Self {
        Self(
            Category::ALL
                .into_iter()
                .map(|c| (c, PeriodAggregate::default()))
                .collect(),
        )
    }
}

impl CategoryTotals {
    pub fn record(&mut self, category: Category, amount: Decimal) {
        self.0.entry(category).or_default().record(amount);
    }

    pub fn get(&self, category: Category) -> PeriodAggregate {
        self.0.get(&category).copied().unwrap_or_default()
    }

    pub fn sum(&self, category: Category) -> Decimal {
        self.get(category).sum
    }

    #[cfg(test)]
    pub fn count(&self, category: Category) -> u64 {
        self.get(category).count
    }

    #[cfg(test)]
    pub fn total_count(&self) -> u64 {
        self.0.values().map(|a| a.count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, PeriodAggregate)> + '_ {
        self.0.iter().map(|(c, a)| (*c, *a))
    }
}

// =============================================================================
// Categorization
// =============================================================================

/// Result of classifying a batch of deals
#[derive(Debug, Default)]
pub struct CategorizedDeals {
    pub by_category: BTreeMap<Category, Vec<Deal>>,
    pub aggregates: BTreeMap<(Category, Period), PeriodAggregate>,
    /// Whole-window totals per login, consumed by the assembler
    pub per_login: HashMap<u64, CategoryTotals>,
    /// Whole-window totals across all logins
    pub overall: CategoryTotals,
    /// Rows dropped for missing login or timestamp
    pub skipped: usize,
    pub granularity: PeriodGranularity,
}

impl CategorizedDeals {
    /// Number of valid deals classified
    pub fn total(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn count(&self, category: Category) -> usize {
        self.by_category.get(&category).map_or(0, Vec::len)
    }

    pub fn login_totals(&self, login: u64) -> CategoryTotals {
        self.per_login.get(&login).cloned().unwrap_or_default()
    }

    pub fn periods(&self) -> BTreeSet<Period> {
        self.aggregates.keys().map(|(_, p)| *p).collect()
    }

    /// All deals with their category, ordered by login, time and deal id
    pub fn sorted_deals(&self) -> Vec<(Category, &Deal)> {
        let mut all: Vec<(Category, &Deal)> = self
            .by_category
            .iter()
            .flat_map(|(c, deals)| deals.iter().map(move |d| (*c, d)))
            .collect();
        all.sort_by_key(|(_, d)| (d.login, d.time, d.id));
        all
    }

    /// Time span covered by the classified deals
    pub fn time_span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut times = self.by_category.values().flatten().map(|d| d.time);
        let first = times.next()?;
        Some(times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }
}

/// Ordered rule set
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl Classifier {
    /// Custom rules are evaluated before the built-in ones
    pub fn with_rules(custom: &[RuleSpec]) -> Result<Self, ReportError> {
        let mut rules = custom
            .iter()
            .map(Rule::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        rules.extend(default_rules());
        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn classify(&self, deal: &Deal) -> Category {
        let comment = deal.comment.trim().to_uppercase();
        self.rules
            .iter()
            .find_map(|rule| rule.evaluate(deal, &comment))
            .unwrap_or(Category::Unclassified)
    }

    /// Classify a bare comment as if it were a zero-amount balance operation
    pub fn classify_comment(&self, comment: &str) -> Category {
        let sample = Deal {
            id: 0,
            login: 0,
            time: NaiveDateTime::default(),
            amount: Decimal::ZERO,
            action: Some(constants::ACTION_BALANCE),
            comment: comment.to_string(),
            currency: None,
            agent: None,
            zip: None,
        };
        self.classify(&sample)
    }

    /// Validate raw rows, then classify and aggregate the valid ones
    pub fn categorize(
        &self,
        raws: impl IntoIterator<Item = RawDeal>,
        granularity: PeriodGranularity,
    ) -> CategorizedDeals {
        let (valid, skipped) = deals::partition_raw(raws);
        let mut categorized = self.categorize_deals(valid, granularity);
        categorized.skipped = skipped;
        categorized
    }

    pub fn categorize_deals(
        &self,
        deals: Vec<Deal>,
        granularity: PeriodGranularity,
    ) -> CategorizedDeals {
        let mut categorized = CategorizedDeals {
            granularity,
            ..Default::default()
        };

        for deal in deals {
            let category = self.classify(&deal);
            let period = Period::of(&deal.time, granularity);

            categorized
                .aggregates
                .entry((category, period))
                .or_default()
                .record(deal.amount);
            categorized
                .per_login
                .entry(deal.login)
                .or_default()
                .record(category, deal.amount);
            categorized.overall.record(category, deal.amount);
            categorized
                .by_category
                .entry(category)
                .or_default()
                .push(deal);
        }

        categorized
    }
}
