pub mod finnhub;
pub mod fmp;
pub mod fred;
pub mod http;
pub mod retry;
pub mod twelvedata;
pub mod yahoo;
pub mod yh_finance;

pub use finnhub::FinnhubAdapter;
pub use fmp::FmpAdapter;
pub use fred::FredSource;
pub use http::build_http_client;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use twelvedata::TwelveDataAdapter;
pub use yahoo::YahooDividendsAdapter;
pub use yh_finance::YhFinanceAdapter;
