// SPDX-License-Identifier: MPL-2.0

//! Enhanced authentication (MQTT 5.0: 4.12)

use async_trait::async_trait;

use super::error::MqttClientError;

/// Where in the exchange the authenticator is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    /// Before CONNECT (or before a re-authentication AUTH); the result becomes
    /// the Authentication Data sent to the server
    ClientInitial,
    /// Server sent AUTH 0x18 with `data`; the result is the client's answer
    ServerChallenge,
    /// CONNACK (or AUTH 0x00) carried the server's final data
    ServerFinal,
}

/// User supplied SASL-style mechanism.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authentication Method; an empty string disables enhanced authentication.
    fn method(&self) -> &str;

    async fn async_auth(&self, step: AuthStep, data: Vec<u8>) -> Result<Vec<u8>, MqttClientError>;
}

/// Runs one step of the exchange. Failures the authenticator reports itself
/// come back as [`MqttClientError::AuthenticationFailed`].
pub(crate) async fn run_step(
    authenticator: &dyn Authenticator,
    step: AuthStep,
    data: Vec<u8>,
) -> Result<Vec<u8>, MqttClientError> {
    authenticator
        .async_auth(step, data)
        .await
        .map_err(|e| match e {
            MqttClientError::OperationCancelled { .. }
            | MqttClientError::AuthenticationFailed { .. } => e,
            other => MqttClientError::AuthenticationFailed {
                method: authenticator.method().to_string(),
                reason: other.user_message(),
            },
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refuse;

    #[async_trait]
    impl Authenticator for Refuse {
        fn method(&self) -> &str {
            "REFUSE"
        }

        async fn async_auth(&self, step: AuthStep, _data: Vec<u8>) -> Result<Vec<u8>, MqttClientError> {
            match step {
                AuthStep::ClientInitial => Ok(Vec::new()),
                AuthStep::ServerChallenge => Err(MqttClientError::InvalidConfiguration {
                    field: "secret".to_string(),
                    reason: "missing".to_string(),
                }),
                AuthStep::ServerFinal => Err(MqttClientError::cancelled("auth")),
            }
        }
    }

    #[tokio::test]
    async fn test_failures_become_authentication_failed() {
        assert!(run_step(&Refuse, AuthStep::ClientInitial, vec![]).await.is_ok());

        let err = run_step(&Refuse, AuthStep::ServerChallenge, vec![])
            .await
            .unwrap_err();
        let MqttClientError::AuthenticationFailed { method, reason } = &err else {
            panic!("unexpected {:?}", err);
        };
        assert_eq!(method, "REFUSE");
        assert!(reason.contains("secret"), "{}", reason);
        assert!(err.should_reconnect());

        // Cancellation passes through untouched
        let err = run_step(&Refuse, AuthStep::ServerFinal, vec![])
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
