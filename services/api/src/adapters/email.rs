//! services/api/src/adapters/email.rs
//!
//! SMTP implementation of the `Notifier` port using Lettre, plus a
//! tracing-only fallback used when no SMTP server is configured. The core
//! hands over a fully populated booking; message formatting lives entirely
//! here.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use tutorbook_core::domain::BookingDetails;
use tutorbook_core::ports::{CoreError, CoreResult, Notifier};

use crate::config::SmtpConfig;

//=========================================================================================
// SMTP Notifier
//=========================================================================================

/// Sends booking emails over SMTP. One message per party where both sides
/// care (confirmation), one to the student otherwise.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> CoreResult<()> {
        let message = Message::builder()
            .from(self.from.parse().map_err(|e| {
                CoreError::Storage(format!("invalid sender address: {e}"))
            })?)
            .to(to
                .parse()
                .map_err(|e| CoreError::Storage(format!("invalid recipient address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| CoreError::Storage(format!("failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| CoreError::Storage(format!("smtp send failed: {e}")))?;
        Ok(())
    }
}

fn session_summary(details: &BookingDetails) -> String {
    format!(
        "<ul>\
         <li><strong>Subject:</strong> {}</li>\
         <li><strong>Start:</strong> {}</li>\
         <li><strong>End:</strong> {}</li>\
         <li><strong>Duration:</strong> {} minutes</li>\
         </ul>",
        details.booking.subject,
        details.slot.start_time.format("%Y-%m-%d %H:%M UTC"),
        details.slot.end_time.format("%Y-%m-%d %H:%M UTC"),
        details.slot.duration_minutes,
    )
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn booking_confirmed(&self, details: &BookingDetails) -> CoreResult<()> {
        let summary = session_summary(details);
        let student_body = format!(
            "<h2>Booking Confirmed</h2>\
             <p>Dear {},</p>\
             <p>Your tutoring session with {} has been confirmed.</p>{summary}\
             <p>You will receive a reminder one hour before your session.</p>",
            details.student.name, details.tutor.name,
        );
        let tutor_body = format!(
            "<h2>New Booking Received</h2>\
             <p>Dear {},</p>\
             <p>{} booked a session with you.</p>{summary}",
            details.tutor.name, details.student.name,
        );

        self.send(&details.student.email, "Tutoring Session Confirmed", student_body)
            .await?;
        self.send(&details.tutor.email, "New Booking Received", tutor_body)
            .await
    }

    async fn booking_cancelled(&self, details: &BookingDetails) -> CoreResult<()> {
        let reason = details
            .booking
            .cancellation_reason
            .as_deref()
            .unwrap_or("no reason given");
        let summary = session_summary(details);
        let body = format!(
            "<h2>Booking Cancelled</h2>\
             <p>The following session was cancelled ({reason}).</p>{summary}"
        );

        self.send(&details.student.email, "Tutoring Session Cancelled", body.clone())
            .await?;
        self.send(&details.tutor.email, "Tutoring Session Cancelled", body)
            .await
    }

    async fn session_reminder(&self, details: &BookingDetails) -> CoreResult<()> {
        let summary = session_summary(details);
        let body = format!(
            "<h2>Session Reminder</h2>\
             <p>Dear {},</p>\
             <p>Your session with {} starts within the hour.</p>{summary}",
            details.student.name, details.tutor.name,
        );
        self.send(&details.student.email, "Upcoming Tutoring Session", body)
            .await
    }
}

//=========================================================================================
// Logging Notifier (no SMTP configured)
//=========================================================================================

/// Logs notifications instead of delivering them. Used in development and
/// whenever the SMTP settings are absent.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn booking_confirmed(&self, details: &BookingDetails) -> CoreResult<()> {
        info!(
            booking_id = %details.booking.id,
            student = %details.student.email,
            tutor = %details.tutor.email,
            "booking confirmed (email delivery disabled)"
        );
        Ok(())
    }

    async fn booking_cancelled(&self, details: &BookingDetails) -> CoreResult<()> {
        info!(
            booking_id = %details.booking.id,
            "booking cancelled (email delivery disabled)"
        );
        Ok(())
    }

    async fn session_reminder(&self, details: &BookingDetails) -> CoreResult<()> {
        info!(
            booking_id = %details.booking.id,
            start = %details.slot.start_time,
            "session reminder (email delivery disabled)"
        );
        Ok(())
    }
}
