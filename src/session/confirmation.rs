//! Confirmation Gate: holds at most one pending approval request.

use super::types::ConfirmationRequest;

#[derive(Debug, Default)]
pub struct ConfirmationGate {
    pending: Option<ConfirmationRequest>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a new request. A second request while one is pending replaces it.
    pub fn open(&mut self, request: ConfirmationRequest) {
        if let Some(previous) = &self.pending {
            tracing::warn!(
                pending_tool_id = %previous.tool_id,
                new_tool_id = %request.tool_id,
                "confirmation requested while another is pending, replacing"
            );
        }
        self.pending = Some(request);
    }

    pub fn pending(&self) -> Option<&ConfirmationRequest> {
        self.pending.as_ref()
    }

    /// Resolve the pending request if `tool_id` matches it.
    /// Stale or absent ids leave the gate untouched.
    pub fn resolve(&mut self, tool_id: &str) -> Option<ConfirmationRequest> {
        match &self.pending {
            Some(req) if req.tool_id == tool_id => self.pending.take(),
            Some(req) => {
                tracing::debug!(
                    pending_tool_id = %req.tool_id,
                    tool_id = %tool_id,
                    "ignoring decision for stale tool id"
                );
                None
            }
            None => None,
        }
    }

    /// Drop whatever is pending.
    pub fn clear(&mut self) -> Option<ConfirmationRequest> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn request(tool_id: &str) -> ConfirmationRequest {
        ConfirmationRequest {
            tool_id: tool_id.into(),
            tool_name: "delete_signup".into(),
            tool_input: Map::new(),
            summary: "Delete person 5".into(),
        }
    }

    #[test]
    fn test_resolve_matching_id() {
        let mut gate = ConfirmationGate::new();
        gate.open(request("t1"));
        assert_eq!(gate.resolve("t1").unwrap().tool_id, "t1");
        assert!(gate.pending().is_none());
        assert!(gate.resolve("t1").is_none(), "never resolved twice");
    }

    #[test]
    fn test_stale_id_is_noop() {
        let mut gate = ConfirmationGate::new();
        gate.open(request("t1"));
        assert!(gate.resolve("t0").is_none());
        assert_eq!(gate.pending().unwrap().tool_id, "t1");
    }

    #[test]
    fn test_second_request_replaces() {
        let mut gate = ConfirmationGate::new();
        gate.open(request("t1"));
        gate.open(request("t2"));
        assert!(gate.resolve("t1").is_none());
        assert!(gate.resolve("t2").is_some());
    }

    #[test]
    fn test_clear_on_empty_gate() {
        let mut gate = ConfirmationGate::new();
        assert!(gate.clear().is_none());
    }
}
