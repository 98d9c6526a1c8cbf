use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::chain::{ChainError, ChainInterface, CoreCall};
use crate::types::config::pipeline::RetryConfig;
use crate::types::request::{short_id, RequestId};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{method} rejected by the chain after {attempts} attempt(s): {source}")]
    Rejected {
        method: &'static str,
        attempts: u32,
        #[source]
        source: ChainError,
    },

    #[error("{method} could not be sent after {attempts} attempt(s): {source}")]
    Failed {
        method: &'static str,
        attempts: u32,
        #[source]
        source: ChainError,
    },
}

impl SubmissionError {
    fn from_chain(method: &'static str, attempts: u32, source: ChainError) -> Self {
        if source.is_rejection() {
            SubmissionError::Rejected {
                method,
                attempts,
                source,
            }
        } else {
            SubmissionError::Failed {
                method,
                attempts,
                source,
            }
        }
    }
}

/// Extra attempts after the first failure, and the pause before each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionPolicy {
    pub submit: RetryPolicy,
    pub finalize: RetryPolicy,
}

impl From<&RetryConfig> for SubmissionPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            submit: RetryPolicy {
                retries: config.submit_retries,
                delay: Duration::from_millis(config.submit_retry_delay_ms),
            },
            finalize: RetryPolicy {
                retries: config.finalize_retries,
                delay: Duration::from_millis(config.finalize_retry_delay_ms),
            },
        }
    }
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

pub struct TransactionSubmitter {
    chain: Arc<dyn ChainInterface>,
    signer: Address,
    /// Held for the duration of one send, never across a retry delay.
    nonce_lock: Mutex<()>,
    policy: SubmissionPolicy,
}

impl TransactionSubmitter {
    pub fn new(chain: Arc<dyn ChainInterface>, signer: Address, policy: SubmissionPolicy) -> Self {
        Self {
            chain,
            signer,
            nonce_lock: Mutex::new(()),
            policy,
        }
    }

    /// `submitResult(id, result)`.
    pub async fn submit_result(
        &self,
        request_id: RequestId,
        result: String,
    ) -> Result<TxHash, SubmissionError> {
        self.send_with_retry(
            CoreCall::SubmitResult { request_id, result },
            self.policy.submit,
        )
        .await
    }

    /// `fulfillRequest(id)`.
    pub async fn finalize(&self, request_id: RequestId) -> Result<TxHash, SubmissionError> {
        self.send_with_retry(CoreCall::FulfillRequest { request_id }, self.policy.finalize)
            .await
    }

    async fn send_with_retry(
        &self,
        call: CoreCall,
        policy: RetryPolicy,
    ) -> Result<TxHash, SubmissionError> {
        let method = call.method();
        let id = short_id(&call.request_id());
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = {
                let _guard = self.nonce_lock.lock().await;
                self.chain.send_transaction(call.clone()).await
            };

            match result {
                Ok(hash) => {
                    tracing::debug!(request_id = %id, "{} sent from {} in {}", method, self.signer, hash);
                    return Ok(hash);
                }
                Err(e) if attempt > policy.retries => {
                    return Err(SubmissionError::from_chain(method, attempt, e));
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %id,
                        "{} attempt {} failed: {}. Retrying in {:?}",
                        method,
                        attempt,
                        e,
                        policy.delay
                    );
                    if !policy.delay.is_zero() {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use alloy::primitives::B256;

    fn policy(submit_retries: u32, finalize_retries: u32) -> SubmissionPolicy {
        SubmissionPolicy {
            submit: RetryPolicy {
                retries: submit_retries,
                delay: Duration::ZERO,
            },
            finalize: RetryPolicy {
                retries: finalize_retries,
                delay: Duration::from_millis(5),
            },
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = SubmissionPolicy::default();
        assert_eq!(policy.submit.retries, 0);
        assert_eq!(policy.finalize.retries, 1);
        assert_eq!(policy.finalize.delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sends_are_serialized() {
        let chain = Arc::new(MockChain::new());
        chain.set_send_delay(Duration::from_millis(10));
        let submitter = Arc::new(TransactionSubmitter::new(
            chain.clone(),
            Address::ZERO,
            policy(0, 0),
        ));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8u8 {
            let submitter = submitter.clone();
            tasks.spawn(async move {
                if i % 2 == 0 {
                    submitter.submit_result(B256::repeat_byte(i), i.to_string()).await
                } else {
                    submitter.finalize(B256::repeat_byte(i)).await
                }
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_eq!(chain.sent().len(), 8);
        assert_eq!(chain.max_in_flight_sends(), 1);
    }

    #[tokio::test]
    async fn test_finalize_retries_once() {
        let chain = Arc::new(MockChain::new());
        chain.fail_next_send(ChainError::Transport("reset".into()));
        let submitter = TransactionSubmitter::new(chain.clone(), Address::ZERO, policy(0, 1));

        submitter.finalize(B256::repeat_byte(1)).await.unwrap();
        assert_eq!(chain.sent_count("fulfillRequest"), 1);
    }

    #[tokio::test]
    async fn test_second_finalize_failure_is_final() {
        let chain = Arc::new(MockChain::new());
        chain.fail_next_send(ChainError::Transport("reset".into()));
        chain.fail_next_send(ChainError::Rejected("already fulfilled".into()));
        let submitter = TransactionSubmitter::new(chain.clone(), Address::ZERO, policy(0, 1));

        let err = submitter.finalize(B256::repeat_byte(1)).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected { attempts: 2, .. }));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_submit_without_retries_fails_immediately() {
        let chain = Arc::new(MockChain::new());
        chain.fail_next_send(ChainError::Transport("timeout".into()));
        let submitter = TransactionSubmitter::new(chain.clone(), Address::ZERO, policy(0, 1));

        let err = submitter
            .submit_result(B256::repeat_byte(1), "42".into())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Failed { attempts: 1, .. }));

        // The queued failure was consumed; the next send goes through.
        submitter
            .submit_result(B256::repeat_byte(1), "42".into())
            .await
            .unwrap();
        assert_eq!(chain.sent_count("submitResult"), 1);
    }
}
