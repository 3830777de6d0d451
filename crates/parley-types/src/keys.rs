//! Collection names, document field keys and preference keys.
//!
//! These strings are part of the stored data format: documents written by one
//! client version must stay readable by the next, so never rename them.

// -- Collections --

pub const COLLECTION_USERS: &str = "user";
pub const COLLECTION_CHAT: &str = "chat";

// -- User document fields --

pub const FIRST_NAME: &str = "First name";
pub const LAST_NAME: &str = "Last name";
pub const EMAIL: &str = "email";
pub const PASSWORD: &str = "password";
pub const IMAGE: &str = "image";
pub const FCM_TOKEN: &str = "fcmToken";

// -- Chat document fields --

pub const SENDER_ID: &str = "senderId";
pub const RECEIVER_ID: &str = "receiverId";
pub const MESSAGE: &str = "message";
pub const TIMESTAMP: &str = "timestamp";

// -- Preferences --

pub const PREFERENCE_NAME: &str = "chatAppPreference";
pub const USER_ID: &str = "userid";
pub const IS_SIGNED_IN: &str = "isSignedIn";
