use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

/// Metadata describing one received call.
///
/// The transport builds a context when a call arrives; the service stamps it
/// with a call id and the method it was delivered to before handing it to an
/// armed receive.
#[derive(Debug, Clone)]
pub struct CallContext {
    call_id: u64,
    method_index: usize,
    method_name: String,
    peer: Option<SocketAddr>,
    metadata: BTreeMap<String, String>,
    received_at: Instant,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            call_id: 0,
            method_index: 0,
            method_name: String::new(),
            peer: None,
            metadata: BTreeMap::new(),
            received_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stamps the identity assigned by the service at delivery time.
    pub(crate) fn assign(&mut self, call_id: u64, method_index: usize, method_name: &str) {
        self.call_id = call_id;
        self.method_index = method_index;
        self.method_name.clear();
        self.method_name.push_str(method_name);
    }

    /// Service-wide, monotonically increasing call number (starts at 1).
    pub const fn call_id(&self) -> u64 {
        self.call_id
    }

    pub const fn method_index(&self) -> usize {
        self.method_index
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub const fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub const fn received_at(&self) -> Instant {
        self.received_at
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_time_is_stamped_at_construction_and_kept_on_assign() {
        let before = Instant::now();
        let mut context = CallContext::new().with_metadata("x-tenant", "acme");
        let stamped = context.received_at();
        assert!(stamped >= before);

        context.assign(7, 2, "Len");
        assert_eq!(context.received_at(), stamped);
        assert_eq!(context.call_id(), 7);
        assert_eq!(context.method_index(), 2);
        assert_eq!(context.method_name(), "Len");
        assert_eq!(context.metadata("x-tenant"), Some("acme"));
    }
}
