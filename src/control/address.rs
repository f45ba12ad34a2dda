//! Device address normalization and command URL construction.

/// Normalized device address (`host[:port]`, no scheme, no trailing slash).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Normalize user input: trim, drop a leading `http://`/`https://`
    /// (any case) and any trailing slashes.
    pub fn normalize(input: &str) -> Self {
        let mut address = input.trim();
        for scheme in ["http://", "https://"] {
            if address.get(..scheme.len()).is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme)) {
                address = &address[scheme.len()..];
                break;
            }
        }
        Self(address.trim_end_matches('/').to_string())
    }

    /// Normalize `input`, keeping `previous` if the result would be empty.
    pub fn normalize_or(input: &str, previous: &DeviceAddress) -> Self {
        let address = Self::normalize(input);
        if address.is_empty() { previous.clone() } else { address }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `http://<address>`, or `None` when no address is configured.
    pub fn base_url(&self) -> Option<String> {
        if self.is_empty() { None } else { Some(format!("http://{}", self.0)) }
    }

    /// Full URL for a command target with a `_ts` cache buster appended.
    pub fn command_url(&self, target: &str, epoch_ms: i64) -> Option<String> {
        let url = format!("{}{}", self.base_url()?, target);
        let separator = if url.contains('?') { '&' } else { '?' };
        Some(format!("{}{}_ts={}", url, separator, epoch_ms))
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_trailing_slashes() {
        assert_eq!(DeviceAddress::normalize(" http://192.168.1.20/ ").as_str(), "192.168.1.20");
        assert_eq!(DeviceAddress::normalize("HTTPS://esp.local:8080///").as_str(), "esp.local:8080");
        assert_eq!(DeviceAddress::normalize("10.0.0.5").as_str(), "10.0.0.5");
    }

    #[test]
    fn empty_input_keeps_previous_address() {
        let previous = DeviceAddress::normalize("192.168.100.7");
        assert_eq!(DeviceAddress::normalize_or("  http:// ", &previous), previous);
        assert_eq!(DeviceAddress::normalize_or("10.0.0.9", &previous).as_str(), "10.0.0.9");
    }

    #[test]
    fn cache_buster_uses_the_right_separator() {
        let address = DeviceAddress::normalize("192.168.100.7");
        assert_eq!(
            address.command_url("/api/health", 1700000000123).as_deref(),
            Some("http://192.168.100.7/api/health?_ts=1700000000123")
        );
        assert_eq!(
            address.command_url("/api/power?on=1", 42).as_deref(),
            Some("http://192.168.100.7/api/power?on=1&_ts=42")
        );
    }

    #[test]
    fn empty_address_has_no_url() {
        assert_eq!(DeviceAddress::default().command_url("/api/health", 1), None);
    }
}
