//! Centralized constants for the MT5 report tools
//!
//! Schema names and MT5 action codes are fixed by the trade server.
//! Connection details and credentials are loaded from config.toml.

// =============================================================================
// Files and Directories
// =============================================================================

/// Default config file path
pub const CONFIG_FILE: &str = "config.toml";

/// SQLite store for saved configurations and scheduled tasks
pub const STORE_FILENAME: &str = "mt5-reports.db";

/// Daily report CSV output
pub const DAILY_REPORT_FILENAME: &str = "daily_report.csv";

/// Categorized deals CSV output
pub const DEALS_FILENAME: &str = "categorized_deals.csv";

/// Per-category summary CSV output
pub const CATEGORY_SUMMARY_FILENAME: &str = "category_summary.csv";

// =============================================================================
// MT5 Schema
// =============================================================================

/// Year-partitioned deals table prefix (mt5_deals_2025)
pub const DEALS_TABLE_PREFIX: &str = "mt5_deals_";

/// Year-partitioned daily account state table prefix (mt5_daily_2025)
pub const DAILY_TABLE_PREFIX: &str = "mt5_daily_";

/// Account metadata table (agent, ZIP code)
pub const USERS_TABLE: &str = "mt5_users";

/// Logins at or below this value are manager/service accounts
pub const LOGIN_FLOOR: u64 = 9999;

/// Upper bound on logins bound into a single IN (...) clause
pub const MAX_LOGINS_PER_QUERY: usize = 500;

/// Default MySQL port
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

// =============================================================================
// MT5 Deal Actions (IMTDeal::EnDealAction)
// =============================================================================

pub const ACTION_BUY: u32 = 0;
pub const ACTION_SELL: u32 = 1;
pub const ACTION_BALANCE: u32 = 2;
pub const ACTION_CREDIT: u32 = 3;
pub const ACTION_BONUS: u32 = 6;

/// Cash-flow actions always included in a report
pub const CASH_FLOW_ACTIONS: [u32; 3] = [ACTION_BALANCE, ACTION_CREDIT, ACTION_BONUS];

/// Trade actions, included only when a configuration asks for them
pub const TRADE_ACTIONS: [u32; 2] = [ACTION_BUY, ACTION_SELL];

// =============================================================================
// Presentation
// =============================================================================

pub const SHEET_SUMMARY: &str = "Summary";
pub const SHEET_DAILY_REPORT: &str = "Daily_Report";
pub const SHEET_DEALS: &str = "Categorized_Deals";

/// Header fill used on every sheet title row
pub const HEADER_COLOR: u32 = 0x2E4A75;

/// Deals shown in the console before truncating the listing
pub const CONSOLE_MAX_DEAL_ROWS: usize = 50;

/// Comment characters shown in the console deal listing
pub const CONSOLE_COMMENT_CHARS: usize = 40;

/// Generation timestamp format used on every artifact
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp format embedded in artifact filenames
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// =============================================================================
// Telegram
// =============================================================================

/// Telegram Bot API base URL (append bot<token>/<method>)
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Maximum length of a sendMessage text
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Maximum length of a sendDocument caption
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

/// Groups listed by name in a caption before collapsing to a count
pub const CAPTION_MAX_GROUPS: usize = 5;

// =============================================================================
// Scheduler
// =============================================================================

/// How often the scheduler checks for due tasks
pub const SCHEDULER_TICK_SECS: u64 = 30;

/// Run history entries shown by `task list`
pub const TASK_HISTORY_LIMIT: i64 = 5;
