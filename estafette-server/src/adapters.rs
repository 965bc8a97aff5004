//! Log-only channel adapters.
//!
//! Stand-ins for the real delivery integrations: each one records the
//! would-be delivery at info level and succeeds. Deployments wire real
//! adapters in their place.

use async_trait::async_trait;
use estafette::jobs::{
    AppointmentConfirmation, AppointmentReminder, EmailChannel, GenerateReport, MessagingChannel,
    PaymentReceipt, ReportChannel, SendEmail, SendWhatsApp,
};

pub struct LogMessagingChannel;

#[async_trait]
impl MessagingChannel for LogMessagingChannel {
    async fn appointment_reminder(&self, reminder: &AppointmentReminder) -> anyhow::Result<()> {
        tracing::info!(
            appointment_id = reminder.appointment_id,
            patient_id = reminder.patient_id,
            company_id = reminder.company_id,
            reminder_type = %reminder.reminder_type,
            "messaging channel not configured, reminder logged only"
        );
        Ok(())
    }

    async fn appointment_confirmation(
        &self,
        confirmation: &AppointmentConfirmation,
    ) -> anyhow::Result<()> {
        tracing::info!(
            appointment_id = confirmation.appointment_id,
            patient_id = confirmation.patient_id,
            company_id = confirmation.company_id,
            "messaging channel not configured, confirmation logged only"
        );
        Ok(())
    }

    async fn text_message(&self, message: &SendWhatsApp) -> anyhow::Result<()> {
        tracing::info!(
            to = %message.to,
            company_id = message.company_id,
            has_media = message.media_url.is_some(),
            "messaging channel not configured, text logged only"
        );
        Ok(())
    }
}

pub struct LogEmailChannel;

#[async_trait]
impl EmailChannel for LogEmailChannel {
    async fn payment_receipt(&self, receipt: &PaymentReceipt) -> anyhow::Result<()> {
        tracing::info!(
            payment_id = receipt.payment_id,
            patient_id = receipt.patient_id,
            company_id = receipt.company_id,
            "email channel not configured, receipt logged only"
        );
        Ok(())
    }

    async fn email(&self, email: &SendEmail) -> anyhow::Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            company_id = email.company_id,
            "email channel not configured, email logged only"
        );
        Ok(())
    }
}

pub struct LogReportChannel;

#[async_trait]
impl ReportChannel for LogReportChannel {
    async fn generate(&self, request: &GenerateReport) -> anyhow::Result<()> {
        tracing::info!(
            company_id = request.company_id,
            "report backend not configured, request logged only"
        );
        Ok(())
    }
}
