/// Object-storage address of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDestination {
    pub bucket: String,
    pub key: String,
}

/// Webhook address of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookDestination {
    pub url: String,
    pub auth: WebhookAuth,
}

#[derive(Clone, PartialEq, Eq)]
pub enum WebhookAuth {
    None,
    Bearer { token: String },
    Basic { username: String, password: String },
}

// Credentials stay out of logs.
impl std::fmt::Debug for WebhookAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookAuth::None => f.write_str("None"),
            WebhookAuth::Bearer { .. } => f.write_str("Bearer(..)"),
            WebhookAuth::Basic { username, .. } => write!(f, "Basic({username}, ..)"),
        }
    }
}
