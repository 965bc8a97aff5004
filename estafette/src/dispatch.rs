//! Maps domain events onto job submissions.
//!
//! Triggers fan out into queue submissions and nothing else: no channel
//! I/O, no business-record writes. Calling a trigger twice for the same
//! event produces duplicate jobs; deduplication is the caller's problem.

use crate::core::queue::{Queue, QueueError};
use crate::core::{DateTime, Duration, Xid};
use crate::jobs::{
    AppointmentConfirmation, AppointmentConfirmationJob, AppointmentReminder,
    AppointmentReminderJob, GenerateReport, GenerateReportJob, PaymentReceipt, PaymentReceiptJob,
    ReminderType, SendEmail, SendEmailJob, SendWhatsApp, SendWhatsAppJob,
};
use crate::scheduler::DelayScheduler;
use std::sync::Arc;

const REMINDER_PRIORITY: i8 = 1;
const CONFIRMATION_PRIORITY: i8 = 2;
const RECEIPT_PRIORITY: i8 = 1;
const EMAIL_PRIORITY: i8 = 3;
const WHATSAPP_PRIORITY: i8 = 2;
const REPORT_PRIORITY: i8 = 5;

/// An appointment as the calendar subsystem reports it.
#[derive(Debug, Clone)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub company_id: i64,
    pub start_time: DateTime,
}

#[derive(Debug, Clone)]
pub struct Payment {
    pub id: i64,
    pub patient_id: i64,
    pub company_id: i64,
    pub amount_cents: i64,
}

#[derive(Debug, Clone)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company_id: i64,
}

#[derive(Debug, Clone)]
pub struct StockItem {
    pub id: i64,
    pub name: String,
    pub quantity: i64,
    pub min_quantity: i64,
    pub company_id: i64,
}

/// Ids of the jobs one appointment fans out into. `None` means the job was
/// not submitted: either the reminder's window had already passed, or the
/// queue backend is disabled.
///
/// Callers that want to cancel reminders when the appointment is cancelled
/// must persist these ids; the queue has no other way to find them later.
#[derive(Debug, Clone, Default)]
pub struct AppointmentAutomations {
    pub confirmation: Option<Xid>,
    pub reminder_day_before: Option<Xid>,
    pub reminder_hour_before: Option<Xid>,
}

/// One method per domain event. Holds the queue and the delay scheduler it
/// submits through, so trigger behavior can be exercised against any
/// [`Queue`] implementation.
pub struct Dispatcher<Q> {
    queue: Arc<Q>,
    scheduler: DelayScheduler<Q>,
}

impl<Q> Dispatcher<Q>
where
    Q: Queue,
{
    pub fn new(queue: Arc<Q>) -> Self {
        let scheduler = DelayScheduler::new(queue.clone());
        Self { queue, scheduler }
    }

    /// An appointment was booked: confirm right away, then remind the
    /// patient a day and an hour ahead of the start time. Reminders whose
    /// window has already passed are skipped, each independently.
    pub async fn appointment_created(
        &self,
        appointment: &Appointment,
    ) -> Result<AppointmentAutomations, QueueError> {
        tracing::info!(appointment_id = appointment.id, "trigger: appointment created");

        let confirmation = self
            .queue
            .schedule::<AppointmentConfirmationJob>(
                AppointmentConfirmation {
                    appointment_id: appointment.id,
                    patient_id: appointment.patient_id,
                    company_id: appointment.company_id,
                },
                CONFIRMATION_PRIORITY,
            )
            .await?;

        let reminder_day_before = self
            .scheduler
            .schedule_before::<AppointmentReminderJob>(
                appointment.start_time,
                Duration::hours(24),
                self.reminder_payload(appointment, ReminderType::DayBefore),
                REMINDER_PRIORITY,
            )
            .await?;

        let reminder_hour_before = self
            .scheduler
            .schedule_before::<AppointmentReminderJob>(
                appointment.start_time,
                Duration::hours(1),
                self.reminder_payload(appointment, ReminderType::HourBefore),
                REMINDER_PRIORITY,
            )
            .await?;

        Ok(AppointmentAutomations {
            confirmation,
            reminder_day_before,
            reminder_hour_before,
        })
    }

    /// The patient confirmed the appointment. No queue effect today.
    pub async fn appointment_confirmed(&self, appointment_id: i64) -> Result<(), QueueError> {
        tracing::info!(appointment_id, "trigger: appointment confirmed");
        Ok(())
    }

    /// The appointment was cancelled. The reminders scheduled by
    /// [`appointment_created`](Self::appointment_created) should be cancelled
    /// here, but the queue can only target them by id and this subsystem does
    /// not keep the appointment-to-job mapping.
    ///
    /// TODO: once callers persist [`AppointmentAutomations`], look the ids up
    /// here and call `Queue::cancel_job` for both reminders.
    pub async fn appointment_cancelled(&self, appointment_id: i64) -> Result<(), QueueError> {
        tracing::warn!(
            appointment_id,
            "trigger: appointment cancelled; scheduled reminders are left in place"
        );
        Ok(())
    }

    /// A payment cleared: email the patient a receipt.
    pub async fn payment_confirmed(&self, payment: &Payment) -> Result<Option<Xid>, QueueError> {
        tracing::info!(payment_id = payment.id, "trigger: payment confirmed");
        self.queue
            .schedule::<PaymentReceiptJob>(
                PaymentReceipt {
                    payment_id: payment.id,
                    patient_id: payment.patient_id,
                    company_id: payment.company_id,
                },
                RECEIPT_PRIORITY,
            )
            .await
    }

    /// A patient signed up. Extension point for the welcome email; submits
    /// nothing yet.
    pub async fn patient_created(&self, patient: &Patient) -> Result<(), QueueError> {
        tracing::info!(patient_id = patient.id, "trigger: patient created");
        Ok(())
    }

    /// Stock fell under its minimum. Extension point for administrator
    /// alerting; submits nothing yet.
    pub async fn low_stock(&self, item: &StockItem) -> Result<(), QueueError> {
        tracing::info!(
            item_id = item.id,
            quantity = item.quantity,
            min_quantity = item.min_quantity,
            "trigger: low stock"
        );
        Ok(())
    }

    /// Submit a free-form email.
    pub async fn send_email(&self, email: SendEmail) -> Result<Option<Xid>, QueueError> {
        self.queue
            .schedule::<SendEmailJob>(email, EMAIL_PRIORITY)
            .await
    }

    /// Submit a free-form messaging-channel text.
    pub async fn send_whatsapp(&self, message: SendWhatsApp) -> Result<Option<Xid>, QueueError> {
        self.queue
            .schedule::<SendWhatsAppJob>(message, WHATSAPP_PRIORITY)
            .await
    }

    /// Submit a report generation request.
    pub async fn generate_report(&self, request: GenerateReport) -> Result<Option<Xid>, QueueError> {
        self.queue
            .schedule::<GenerateReportJob>(request, REPORT_PRIORITY)
            .await
    }

    fn reminder_payload(
        &self,
        appointment: &Appointment,
        reminder_type: ReminderType,
    ) -> AppointmentReminder {
        AppointmentReminder {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            company_id: appointment.company_id,
            reminder_type,
        }
    }
}
