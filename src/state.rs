use crate::rate_limit::RateLimiter;
use crate::routes::RouteTable;

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub routes: RouteTable,
    pub limiter: RateLimiter,
}
