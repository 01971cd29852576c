use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use airt::{Error, NewUser, Table, User, UserUpdate};

use super::{ListArgs, OutputArgs, Session};
use crate::prompts::{self, OtpSource};

const MAX_PHONE_OTP_ATTEMPTS: usize = 10;
const MAX_MFA_OTP_ATTEMPTS: usize = 3;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Show details of a user
    Details {
        /// uuid or username; only super users may look up other accounts
        #[arg(short, long)]
        user: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Create a new user (super users only)
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Subscription type (e.g. small, medium, large, test)
        #[arg(long)]
        subscription_type: String,
        /// Grant super user privileges
        #[arg(long)]
        super_user: bool,
        /// Phone number with country code, in any common notation
        #[arg(long)]
        phone_number: Option<String>,
        /// Six-digit code from the authenticator app, if MFA is enabled
        #[arg(long)]
        otp: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List users (super users only)
    Ls {
        #[command(flatten)]
        list: ListArgs,

        /// List only disabled users
        #[arg(long)]
        disabled: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Disable one or more users
    Disable {
        /// uuids or usernames
        #[arg(required = true)]
        users: Vec<String>,
        #[arg(long)]
        otp: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Enable one or more disabled users
    Enable {
        /// uuids or usernames
        #[arg(required = true)]
        users: Vec<String>,
        #[arg(long)]
        otp: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Update account details
    Update {
        /// uuid or username of the account to update; defaults to the logged-in user
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        otp: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Register and verify a phone number for SMS one-time passwords
    RegisterPhoneNumber {
        /// Defaults to the number already on the account
        #[arg(long)]
        phone_number: Option<String>,
        #[arg(long)]
        otp: Option<String>,
    },

    /// Reset the account password with a TOTP or an SMS OTP
    ResetPassword {
        #[arg(short, long)]
        username: Option<String>,
        #[arg(long)]
        new_password: Option<String>,
        #[arg(long)]
        otp: Option<String>,
    },

    /// Multi-factor authentication
    #[command(subcommand)]
    Mfa(MfaCommands),

    /// Single sign-on
    #[command(subcommand)]
    Sso(SsoCommands),
}

#[derive(Subcommand)]
pub enum MfaCommands {
    /// Enroll an authenticator app and activate MFA
    Enable {
        #[arg(long)]
        otp: Option<String>,
    },
    /// Disable MFA
    Disable {
        /// uuid or username (super users only)
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        otp: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SsoCommands {
    /// Enable single sign-on with a provider
    Enable {
        /// SSO provider, e.g. google or github
        sso_provider: String,
        /// Email used with the provider
        #[arg(long)]
        sso_email: String,
        #[arg(long)]
        otp: Option<String>,
    },
    /// Disable single sign-on with a provider
    Disable {
        sso_provider: String,
        /// uuid or username (super users only)
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        otp: Option<String>,
    },
}

fn user_table(user: &User) -> Result<Table> {
    Ok(User::as_table(std::slice::from_ref(user))?)
}

fn phone_registration_hint(user: &User) -> Option<String> {
    if user.is_phone_number_verified {
        return None;
    }
    Some(
        "No verified phone number on this account. Run 'airt user register-phone-number' \
         to receive one-time passwords by SMS."
            .to_string(),
    )
}

/// The service gives up on further attempts after these.
fn is_final_otp_error(err: &Error) -> bool {
    let message = err.to_string();
    message.contains("Too many failed attempts") || message.contains("OTP is expired")
}

/// OTP from the flag, or from the authenticator app or an SMS.
async fn obtain_otp(
    session: &Session,
    otp: Option<String>,
    username: &str,
    message_template_name: &str,
) -> Result<String> {
    if let Some(otp) = otp {
        return Ok(otp);
    }

    match prompts::prompt_otp_source()? {
        OtpSource::Authenticator => prompts::prompt_otp("Code from your authenticator app:"),
        OtpSource::Sms => {
            let status = User::send_sms_otp(&session.client()?, username, message_template_name)
                .await
                .context("Failed to send the SMS")?;
            println!("{}", status);
            prompts::prompt_otp("OTP received by SMS:")
        }
    }
}

pub async fn run(cmd: UserCommands, session: &Session) -> Result<()> {
    match cmd {
        UserCommands::Details { user, output } => {
            let client = session.authenticated().await?;
            let details = User::details(&client, user.as_deref())
                .await
                .context("Failed to get user details")?;
            output.print(user_table(&details)?, "uuid");
        }
        UserCommands::Create {
            username,
            first_name,
            last_name,
            email,
            password,
            subscription_type,
            super_user,
            phone_number,
            otp,
            output,
        } => {
            let client = session.authenticated().await?;
            let new_user = NewUser {
                username,
                first_name,
                last_name,
                email,
                password,
                subscription_type,
                super_user,
                phone_number,
            };
            let table = User::create(&client, &new_user, otp.as_deref())
                .await
                .context("Failed to create user")?;
            output.print(table, "uuid");
        }
        UserCommands::Ls {
            list,
            disabled,
            output,
        } => {
            let client = session.authenticated().await?;
            let users = User::ls(&client, list.offset, list.limit, disabled)
                .await
                .context("Failed to list users")?;
            output.print(User::as_table(&users)?, "uuid");
        }
        UserCommands::Disable { users, otp, output } => {
            let client = session.authenticated().await?;
            let table = User::disable(&client, users.as_slice(), otp.as_deref())
                .await
                .context("Failed to disable users")?;
            output.print(table, "uuid");
        }
        UserCommands::Enable { users, otp, output } => {
            let client = session.authenticated().await?;
            let table = User::enable(&client, users.as_slice(), otp.as_deref())
                .await
                .context("Failed to enable users")?;
            output.print(table, "uuid");
        }
        UserCommands::Update {
            user,
            username,
            first_name,
            last_name,
            email,
            otp,
            output,
        } => {
            let client = session.authenticated().await?;
            let update = UserUpdate {
                username,
                first_name,
                last_name,
                email,
            };
            let table = User::update(&client, user.as_deref(), &update, otp.as_deref())
                .await
                .context("Failed to update user")?;
            output.print(table, "uuid");
        }
        UserCommands::RegisterPhoneNumber { phone_number, otp } => {
            let client = session.authenticated().await?;
            let user = User::register_phone_number(&client, phone_number.as_deref(), otp.as_deref())
                .await
                .context("Failed to register the phone number")?;
            let number = user.phone_number.unwrap_or_default();

            for _ in 0..MAX_PHONE_OTP_ATTEMPTS {
                let sms_otp = prompts::prompt_otp(&format!(
                    "We have sent a one-time password to {}. Please enter it here:",
                    number
                ))?;
                match User::validate_phone_number(&client, &sms_otp).await {
                    Ok(_) => {
                        println!(
                            "{} The phone number {} is registered. One-time passwords will be sent to it when requested.",
                            "✓".green(),
                            number
                        );
                        return Ok(());
                    }
                    Err(e) if is_final_otp_error(&e) => {
                        return Err(e).context("Phone number registration failed");
                    }
                    Err(e) => eprintln!("{} {}", "✗".red(), e),
                }
            }
            anyhow::bail!("Too many invalid OTPs, please run the command again");
        }
        UserCommands::ResetPassword {
            username,
            new_password,
            otp,
        } => {
            let username = match username {
                Some(u) => u,
                None => prompts::prompt_username()?,
            };
            let new_password = match new_password {
                Some(p) => p,
                None => prompts::prompt_new_password()?,
            };
            let otp = obtain_otp(session, otp, &username, "reset_password").await?;

            let status = User::reset_password(&session.client()?, &username, &new_password, &otp)
                .await
                .context("Failed to reset the password")?;
            println!("{}", status);
            if std::env::var(crate::config::SERVICE_PASSWORD_ENV).is_ok() {
                println!(
                    "Please don't forget to update the password in the {} environment variable",
                    crate::config::SERVICE_PASSWORD_ENV
                );
            }
        }
        UserCommands::Mfa(cmd) => match cmd {
            MfaCommands::Enable { otp } => {
                let client = session.authenticated().await?;
                let url = User::mfa_provision_url(&client, otp.as_deref())
                    .await
                    .context("Failed to generate the MFA secret")?;
                println!("Add this account to your authenticator app (scan it as a QR code or paste it):\n");
                println!("  {}\n", url);

                for attempt in 1..=MAX_MFA_OTP_ATTEMPTS {
                    let code = prompts::prompt_otp("Code from your authenticator app:")?;
                    match User::activate_mfa(&client, &code).await {
                        Ok(user) => {
                            println!("{} Multi-factor authentication activated", "✓".green());
                            if let Some(hint) = phone_registration_hint(&user) {
                                println!("{}", hint);
                            }
                            return Ok(());
                        }
                        Err(e) if attempt == MAX_MFA_OTP_ATTEMPTS => {
                            return Err(e).context("Failed to activate MFA, please run the command again");
                        }
                        Err(e) => eprintln!("{} {}", "✗".red(), e),
                    }
                }
            }
            MfaCommands::Disable { user, otp } => {
                let client = session.authenticated().await?;
                let details = User::details(&client, user.as_deref()).await?;
                let otp = obtain_otp(session, otp, &details.username, "disable_mfa").await?;
                User::disable_mfa(&client, Some(&details.uuid), Some(&otp))
                    .await
                    .context("Failed to disable MFA")?;
                println!(
                    "{} Multi-factor authentication disabled for {}",
                    "✓".green(),
                    details.username
                );
            }
        },
        UserCommands::Sso(cmd) => match cmd {
            SsoCommands::Enable {
                sso_provider,
                sso_email,
                otp,
            } => {
                let client = session.authenticated().await?;
                let message = User::enable_sso(&client, &sso_provider, &sso_email, otp.as_deref())
                    .await
                    .context("Failed to enable SSO")?;
                println!("{}", message);
            }
            SsoCommands::Disable {
                sso_provider,
                user,
                otp,
            } => {
                let client = session.authenticated().await?;
                let message =
                    User::disable_sso(&client, &sso_provider, user.as_deref(), otp.as_deref())
                        .await
                        .context("Failed to disable SSO")?;
                println!("{}", message);
            }
        },
    }

    Ok(())
}
