//! The job types this subsystem knows how to deliver.
//!
//! Payloads are the wire contract between trigger callers and processors;
//! they serialize to the same JSON documents the administrative API shows.
//! Processors do no rendering and no lookups of their own: they hand the
//! payload to a channel adapter, which owns message content and the actual
//! delivery.

use crate::core::job::QueueName;
use crate::core::job_processor::JobProcessor;
use crate::core::{CancellationToken, DateTime, Xid};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which of the appointment reminders a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderType {
    #[serde(rename = "24h")]
    DayBefore,
    #[serde(rename = "1h")]
    HourBefore,
    #[serde(rename = "now")]
    Now,
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReminderType::DayBefore => "24h",
            ReminderType::HourBefore => "1h",
            ReminderType::Now => "now",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentReminder {
    pub appointment_id: i64,
    pub patient_id: i64,
    pub company_id: i64,
    pub reminder_type: ReminderType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentConfirmation {
    pub appointment_id: i64,
    pub patient_id: i64,
    pub company_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub payment_id: i64,
    pub patient_id: i64,
    pub company_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub company_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendWhatsApp {
    pub to: String,
    pub message: String,
    pub company_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportType {
    MonthlyRevenue,
    Inventory,
    Appointments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Excel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: DateTime,
    pub end: DateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReport {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub company_id: i64,
    pub format: ReportFormat,
    pub period: ReportPeriod,
}

/// Delivery of messaging-channel content. Implementations own rendering,
/// localization and the transport; a processor only forwards the payload.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn appointment_reminder(&self, reminder: &AppointmentReminder) -> anyhow::Result<()>;
    async fn appointment_confirmation(
        &self,
        confirmation: &AppointmentConfirmation,
    ) -> anyhow::Result<()>;
    async fn text_message(&self, message: &SendWhatsApp) -> anyhow::Result<()>;
}

/// Delivery of email content.
#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn payment_receipt(&self, receipt: &PaymentReceipt) -> anyhow::Result<()>;
    async fn email(&self, email: &SendEmail) -> anyhow::Result<()>;
}

/// Report generation backend.
#[async_trait]
pub trait ReportChannel: Send + Sync {
    async fn generate(&self, request: &GenerateReport) -> anyhow::Result<()>;
}

pub struct AppointmentReminderJob {
    channel: Arc<dyn MessagingChannel>,
}

impl AppointmentReminderJob {
    pub fn new(channel: Arc<dyn MessagingChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl JobProcessor for AppointmentReminderJob {
    type Payload = AppointmentReminder;
    type Error = anyhow::Error;

    async fn handle(
        &self,
        _jid: Xid,
        payload: Self::Payload,
        _cancellation_token: CancellationToken,
    ) -> Result<(), Self::Error> {
        self.channel.appointment_reminder(&payload).await
    }

    fn name() -> &'static str {
        "appointment-reminder"
    }

    fn queue() -> QueueName {
        QueueName::Messaging
    }
}

pub struct AppointmentConfirmationJob {
    channel: Arc<dyn MessagingChannel>,
}

impl AppointmentConfirmationJob {
    pub fn new(channel: Arc<dyn MessagingChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl JobProcessor for AppointmentConfirmationJob {
    type Payload = AppointmentConfirmation;
    type Error = anyhow::Error;

    async fn handle(
        &self,
        _jid: Xid,
        payload: Self::Payload,
        _cancellation_token: CancellationToken,
    ) -> Result<(), Self::Error> {
        self.channel.appointment_confirmation(&payload).await
    }

    fn name() -> &'static str {
        "appointment-confirmation"
    }

    fn queue() -> QueueName {
        QueueName::Messaging
    }
}

pub struct SendWhatsAppJob {
    channel: Arc<dyn MessagingChannel>,
}

impl SendWhatsAppJob {
    pub fn new(channel: Arc<dyn MessagingChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl JobProcessor for SendWhatsAppJob {
    type Payload = SendWhatsApp;
    type Error = anyhow::Error;

    async fn handle(
        &self,
        _jid: Xid,
        payload: Self::Payload,
        _cancellation_token: CancellationToken,
    ) -> Result<(), Self::Error> {
        self.channel.text_message(&payload).await
    }

    fn name() -> &'static str {
        "send-whatsapp"
    }

    fn queue() -> QueueName {
        QueueName::Messaging
    }
}

pub struct PaymentReceiptJob {
    channel: Arc<dyn EmailChannel>,
}

impl PaymentReceiptJob {
    pub fn new(channel: Arc<dyn EmailChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl JobProcessor for PaymentReceiptJob {
    type Payload = PaymentReceipt;
    type Error = anyhow::Error;

    async fn handle(
        &self,
        _jid: Xid,
        payload: Self::Payload,
        _cancellation_token: CancellationToken,
    ) -> Result<(), Self::Error> {
        self.channel.payment_receipt(&payload).await
    }

    fn name() -> &'static str {
        "payment-receipt"
    }

    fn queue() -> QueueName {
        QueueName::Email
    }
}

pub struct SendEmailJob {
    channel: Arc<dyn EmailChannel>,
}

impl SendEmailJob {
    pub fn new(channel: Arc<dyn EmailChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl JobProcessor for SendEmailJob {
    type Payload = SendEmail;
    type Error = anyhow::Error;

    async fn handle(
        &self,
        _jid: Xid,
        payload: Self::Payload,
        _cancellation_token: CancellationToken,
    ) -> Result<(), Self::Error> {
        self.channel.email(&payload).await
    }

    fn name() -> &'static str {
        "send-email"
    }

    fn queue() -> QueueName {
        QueueName::Email
    }
}

pub struct GenerateReportJob {
    channel: Arc<dyn ReportChannel>,
}

impl GenerateReportJob {
    pub fn new(channel: Arc<dyn ReportChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl JobProcessor for GenerateReportJob {
    type Payload = GenerateReport;
    type Error = anyhow::Error;

    async fn handle(
        &self,
        _jid: Xid,
        payload: Self::Payload,
        _cancellation_token: CancellationToken,
    ) -> Result<(), Self::Error> {
        self.channel.generate(&payload).await
    }

    fn name() -> &'static str {
        "generate-report"
    }

    fn queue() -> QueueName {
        QueueName::Reports
    }
}
