use std::sync::Arc;

use sqlx::PgPool;

use signaldesk_core::compose::CopyGenerator;
use signaldesk_core::dispatch::MailDrafter;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Text-generation capability behind the composer. Injected so tests and
    /// alternative providers can swap it out.
    pub generator: Arc<dyn CopyGenerator>,
    /// External mail-draft boundary used by dispatch runs.
    pub mailer: Arc<dyn MailDrafter>,
}
