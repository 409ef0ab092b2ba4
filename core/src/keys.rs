// Durable key schema shared by the store, session bootstrap, and connection manager
// Every value is stored as a string; see store::KeyValueStore

/// "true" once a session has been established via OTP verification
pub const AUTHENTICATED: &str = "authenticated";
/// Backend user id for the authenticated account
pub const USER_ID: &str = "user_id";
/// Bearer token used for the profile fetch and the realtime handshake
pub const AUTH_TOKEN: &str = "auth_token";
/// Token used to mint a new auth token when it expires
pub const REFRESH_TOKEN: &str = "refresh_token";
/// Phone number the account was verified against
pub const PHONE: &str = "phone";

// Best-effort profile cache. Any of these may be absent; the cached session
// stays usable without them.
pub const FULLNAME: &str = "fullname";
pub const AVATAR_URL: &str = "avatar_url";
pub const WALLET_BALANCE: &str = "wallet_balance";
pub const LOCKED_AMOUNT: &str = "locked_amount";
pub const UNLOCKED_AMOUNT: &str = "unlocked_amount";
pub const KYC_STATUS: &str = "kyc_status";
pub const IS_BLOCKED: &str = "is_blocked";
pub const BLOCKED_TITLE: &str = "blocked_title";
pub const BLOCKED_DETAILS: &str = "blocked_details";
pub const FEATURE_FLAGS: &str = "feature_flags";
pub const PRICE_MULTIPLIER: &str = "price_multiplier";

/// Serialized pending-navigation record (`payload` + `capturedAt` epoch millis)
pub const PENDING_NAV: &str = "pending_nav";

/// Keys that must all be present for a cached session to be trusted at cold start
pub const REQUIRED_SESSION_KEYS: [&str; 4] = [AUTHENTICATED, USER_ID, AUTH_TOKEN, PHONE];

/// Every session and profile key, cleared together on logout
pub const ALL_SESSION_KEYS: [&str; 16] = [
    AUTHENTICATED,
    USER_ID,
    AUTH_TOKEN,
    REFRESH_TOKEN,
    PHONE,
    FULLNAME,
    AVATAR_URL,
    WALLET_BALANCE,
    LOCKED_AMOUNT,
    UNLOCKED_AMOUNT,
    KYC_STATUS,
    IS_BLOCKED,
    BLOCKED_TITLE,
    BLOCKED_DETAILS,
    FEATURE_FLAGS,
    PRICE_MULTIPLIER,
];
