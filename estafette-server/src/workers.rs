//! Wiring of job processors to their delivery channels.

use estafette::jobs::{
    AppointmentConfirmationJob, AppointmentReminderJob, EmailChannel, GenerateReportJob,
    MessagingChannel, PaymentReceiptJob, ReportChannel, SendEmailJob, SendWhatsAppJob,
};
use estafette::prelude::{QueueName, RunnerRouter, WorkerConfig};
use std::sync::Arc;

use crate::adapters::{LogEmailChannel, LogMessagingChannel, LogReportChannel};

/// The delivery integrations processors talk to.
pub struct Channels {
    pub messaging: Arc<dyn MessagingChannel>,
    pub email: Arc<dyn EmailChannel>,
    pub reports: Arc<dyn ReportChannel>,
}

impl Channels {
    /// Log-only channels, for deployments with no delivery integration.
    pub fn log_only() -> Self {
        Self {
            messaging: Arc::new(LogMessagingChannel),
            email: Arc::new(LogEmailChannel),
            reports: Arc::new(LogReportChannel),
        }
    }
}

/// Every job type this service can execute, bound to its channel.
pub fn runner_router(channels: &Channels) -> RunnerRouter {
    let mut router = RunnerRouter::default();
    router.add_job_handler(AppointmentReminderJob::new(channels.messaging.clone()));
    router.add_job_handler(AppointmentConfirmationJob::new(channels.messaging.clone()));
    router.add_job_handler(SendWhatsAppJob::new(channels.messaging.clone()));
    router.add_job_handler(PaymentReceiptJob::new(channels.email.clone()));
    router.add_job_handler(SendEmailJob::new(channels.email.clone()));
    router.add_job_handler(GenerateReportJob::new(channels.reports.clone()));
    router
}

/// Consumer counts per queue. Message delivery is rate-limited upstream,
/// reports are heavy, so both run narrower than the default.
pub fn worker_config() -> WorkerConfig {
    WorkerConfig::new(5)
        .with_concurrency(QueueName::Messaging, 3)
        .with_concurrency(QueueName::Email, 5)
        .with_concurrency(QueueName::Automations, 2)
        .with_concurrency(QueueName::Reports, 1)
}
