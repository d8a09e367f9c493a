use log::{debug, warn};
use serde_json::{json, Value};
use toonsmith_contracts::credentials::Credential;

use crate::config::EngineConfig;
use crate::gemini::{generate_content_endpoint, user_text_contents};
use crate::transport::GenerativeTransport;

fn probe_payload() -> Value {
    json!({
        "contents": user_text_contents("hi"),
        "generationConfig": { "maxOutputTokens": 1 },
    })
}

/// Sends a one-token probe with `credential`. Any failure reads as `false`.
pub fn verify(
    transport: &dyn GenerativeTransport,
    config: &EngineConfig,
    credential: &Credential,
) -> bool {
    let endpoint = generate_content_endpoint(&config.api_base, &config.text_model);
    match transport.post_json(&endpoint, credential, &probe_payload()) {
        Ok(_) => {
            debug!("credential {} verified", credential.masked());
            true
        }
        Err(err) => {
            warn!("credential {} failed verification: {err}", credential.masked());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use toonsmith_contracts::credentials::{Credential, CredentialSource};

    use super::verify;
    use crate::config::EngineConfig;
    use crate::error::TransportError;
    use crate::transport::scripted::{status_error, ScriptedTransport};

    #[test]
    fn probe_asks_for_a_single_token() {
        let transport = ScriptedTransport::new().reply(json!({"candidates": []}));
        let credential = Credential::new("key-aaaa", CredentialSource::User);
        assert!(verify(&transport, &EngineConfig::default(), &credential));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].endpoint.ends_with("gemini-3-flash-preview:generateContent"));
        assert_eq!(calls[0].payload["generationConfig"]["maxOutputTokens"], json!(1));
        assert_eq!(calls[0].credential, "key-aaaa");
    }

    #[test]
    fn every_failure_collapses_to_false() {
        let credential = Credential::new("key-bbbb", CredentialSource::Platform);
        let config = EngineConfig::default();
        for err in [
            status_error(403, "PERMISSION_DENIED"),
            TransportError::Network {
                provider: "Gemini".to_string(),
                message: "dns error".to_string(),
            },
            TransportError::InvalidJson {
                provider: "Gemini".to_string(),
                message: "expected value".to_string(),
            },
        ] {
            let transport = ScriptedTransport::new().fail(err);
            assert!(!verify(&transport, &config, &credential));
            // idempotent: a repeat with the same outcome gives the same answer
            transport.push(Err(status_error(401, "UNAUTHENTICATED")));
            assert!(!verify(&transport, &config, &credential));
        }
    }
}
