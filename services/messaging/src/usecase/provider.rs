use courier_domain::channel::Channel;

use crate::domain::provider::ProviderPort;
use crate::error::MessagingError;

// ── TestProvider ─────────────────────────────────────────────────────────────

pub struct TestProviderUseCase<P: ProviderPort> {
    pub provider: P,
}

impl<P: ProviderPort> TestProviderUseCase<P> {
    /// Configuration problems surface verbatim; anything else as a provider error.
    pub async fn execute(&self, channel: Channel) -> Result<(), MessagingError> {
        self.provider.test_connectivity(channel).await?;
        tracing::info!(channel = %channel, "provider connectivity verified");
        Ok(())
    }
}
