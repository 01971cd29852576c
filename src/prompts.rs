use anyhow::{Context, Result};
use inquire::{validator::Validation, Password, PasswordDisplayMode, Select, Text};
use std::error::Error;

/// Prompt for a six-digit one-time password
pub fn prompt_otp(message: &str) -> Result<String> {
    let otp_validator = |input: &str| -> Result<Validation, Box<dyn Error + Send + Sync>> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Validation::Invalid("OTP cannot be empty".into()));
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            Ok(Validation::Valid)
        } else {
            Ok(Validation::Invalid("The OTP must contain digits only".into()))
        }
    };

    Text::new(message)
        .with_validator(otp_validator)
        .prompt()
        .map(|otp| otp.trim().to_string())
        .context("Failed to read OTP input")
}

pub fn prompt_username() -> Result<String> {
    Text::new("Username:")
        .with_validator(|input: &str| -> Result<Validation, Box<dyn Error + Send + Sync>> {
            if input.trim().is_empty() {
                Ok(Validation::Invalid("Username cannot be empty".into()))
            } else {
                Ok(Validation::Valid)
            }
        })
        .prompt()
        .context("Failed to read username input")
}

pub fn prompt_new_password() -> Result<String> {
    Password::new("New password:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_custom_confirmation_message("Confirm new password:")
        .prompt()
        .context("Failed to read password input")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpSource {
    Authenticator,
    Sms,
}

impl std::fmt::Display for OtpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OtpSource::Authenticator => write!(f, "Use the code from my authenticator app (TOTP)"),
            OtpSource::Sms => write!(f, "Send an OTP by SMS to my registered phone number"),
        }
    }
}

/// Prompt for how the user wants to receive the OTP
pub fn prompt_otp_source() -> Result<OtpSource> {
    Select::new(
        "How do you want to verify your identity?",
        vec![OtpSource::Authenticator, OtpSource::Sms],
    )
    .prompt()
    .context("Failed to read verification option")
}
