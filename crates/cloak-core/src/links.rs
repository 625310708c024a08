//! # Cloaked Links
//!
//! Builds the intermediary URLs that stand in for a provider checkout URL.
//! The provider only ever sees our success/cancel pages, and the customer
//! only ever sees our loading page.

/// URL builder for a deployment origin
#[derive(Debug, Clone)]
pub struct CloakedLinks {
    /// Origin of the application (e.g., "https://pay.example.com")
    pub origin: String,
    /// Page the provider redirects to after payment
    pub success_path: String,
    /// Page the provider redirects to on cancel
    pub cancel_path: String,
    /// Interstitial page that forwards to the provider
    pub loading_path: String,
}

impl CloakedLinks {
    pub fn new(origin: impl Into<String>) -> Self {
        let origin: String = origin.into();
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            success_path: "/thankyou".to_string(),
            cancel_path: "/cancel".to_string(),
            loading_path: "/loading".to_string(),
        }
    }

    pub fn success_url(&self, token: &str) -> String {
        format!("{}{}?fhfh={}", self.origin, self.success_path, token)
    }

    pub fn cancel_url(&self, token: &str) -> String {
        format!("{}{}?fhfh={}", self.origin, self.cancel_path, token)
    }

    /// Loading page carrying the token and the real checkout URL
    pub fn loading_url(&self, token: &str, checkout_url: &str) -> String {
        format!(
            "{}{}?fhfh={}&stripe_url={}",
            self.origin,
            self.loading_path,
            token,
            urlencoding::encode(checkout_url)
        )
    }
}
