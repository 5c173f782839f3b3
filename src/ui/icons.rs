pub struct Icons;

impl Icons {
    pub const COOKIE: &str = "🍪";
    pub const CHECK: &str = "✅";
    pub const INFO: &str = "ℹ️";
    pub const STEP: &str = "➡️";
}
