pub const EMAIL_MAX_LENGTH: usize = 50;
pub const USER_NAME_MAX_LENGTH: usize = 25;
pub const PASSWORD_MIN_LENGTH: usize = 8;

pub const TITLE_MAX_LENGTH: usize = 255;
pub const LINK_MAX_LENGTH: usize = 255;
pub const NAME_MAX_LENGTH: usize = 255;

/// `NUMERIC(5,2)`
pub const COST_MAX_DIGITS: u32 = 5;
pub const COST_SCALE: u32 = 2;

pub const JSON_BODY_LIMIT: u64 = 1024 * 64;

pub const MEDIA_URL: &str = "/media/";
pub const RECIPE_IMAGE_DIR: &str = "uploads/recipe";

/// Scheme keywords accepted in the `Authorization` header.
pub const TOKEN_KEYWORDS: &[&str] = &["Token", "Bearer"];

pub const MAX_TOKEN_LIFETIME_HOURS: i64 = 24 * 365;
