use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Client, WithOtp};
use crate::error::{Error, Result};
use crate::table::{typed_records, Table};
use crate::util::{
    deserialize_datetime, deserialize_nullable, standardize_phone_number, with_otp, with_query,
};

pub const USER_COLS: &[&str] = &[
    "uuid",
    "username",
    "first_name",
    "last_name",
    "email",
    "subscription_type",
    "super_user",
    "disabled",
    "created",
    "is_mfa_active",
    "phone_number",
    "is_phone_number_verified",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub uuid: String,
    pub username: String,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub first_name: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub last_name: Option<String>,
    pub email: String,
    pub subscription_type: String,
    pub super_user: bool,
    pub disabled: bool,
    #[serde(deserialize_with = "deserialize_datetime")]
    pub created: Option<DateTime<Utc>>,
    pub is_mfa_active: bool,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub phone_number: Option<String>,
    pub is_phone_number_verified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub subscription_type: String,
    pub super_user: bool,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserUpdate {
    fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct MfaProvision {
    mfa_url: String,
}

impl User {
    /// Details of `user` (uuid or username), or of the logged-in user.
    ///
    /// Only super users may look up other accounts.
    pub async fn details(client: &Client, user: Option<&str>) -> Result<User> {
        let params: Vec<(&str, String)> = user
            .map(|u| vec![("user_uuid_or_name", u.to_string())])
            .unwrap_or_default();
        client
            .get_data(&with_query("/user/details", &params))
            .await
    }

    pub async fn create(client: &Client, new_user: &NewUser, otp: Option<&str>) -> Result<Table> {
        let mut new_user = new_user.clone();
        new_user.phone_number = new_user
            .phone_number
            .as_deref()
            .map(standardize_phone_number);

        let body = WithOtp {
            body: &new_user,
            otp,
        };
        let created: Value = client.post_data("/user/", &body).await?;
        Table::from_values(&[created], USER_COLS)
    }

    pub async fn ls(client: &Client, offset: u64, limit: u64, disabled: bool) -> Result<Vec<User>> {
        let path = with_query(
            "/user/",
            &[
                ("disabled", disabled.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        );
        let records: Vec<Value> = client.get_data(&path).await?;
        typed_records(records, USER_COLS)
    }

    pub fn as_table(users: &[User]) -> Result<Table> {
        Table::from_records(users, USER_COLS)
    }

    pub async fn disable<S: AsRef<str>>(
        client: &Client,
        users: &[S],
        otp: Option<&str>,
    ) -> Result<Table> {
        let mut disabled = Vec::with_capacity(users.len());
        for user in users {
            let uuid = Self::details(client, Some(user.as_ref())).await?.uuid;
            let path = with_otp(&format!("/user/{}", uuid), otp);
            disabled.push(client.delete_data::<Value>(&path).await?);
        }
        Table::from_values(&disabled, USER_COLS)
    }

    pub async fn enable<S: AsRef<str>>(
        client: &Client,
        users: &[S],
        otp: Option<&str>,
    ) -> Result<Table> {
        let mut enabled = Vec::with_capacity(users.len());
        for user in users {
            let uuid = Self::details(client, Some(user.as_ref())).await?.uuid;
            let path = with_otp(&format!("/user/{}/enable", uuid), otp);
            enabled.push(client.get_data::<Value>(&path).await?);
        }
        Table::from_values(&enabled, USER_COLS)
    }

    pub async fn update(
        client: &Client,
        user: Option<&str>,
        update: &UserUpdate,
        otp: Option<&str>,
    ) -> Result<Table> {
        if update.is_empty() {
            return Err(Error::Validation(
                "Please pass at least one field to update".to_string(),
            ));
        }

        let uuid = Self::details(client, user).await?.uuid;
        let body = WithOtp { body: update, otp };
        let updated: Value = client
            .post_data(&format!("/user/{}/update", uuid), &body)
            .await?;
        Table::from_values(&[updated], USER_COLS)
    }

    /// Starts phone number registration; the service sends an SMS OTP to
    /// the number, to be confirmed with [`User::validate_phone_number`].
    /// Without a number, the one already on the account is used.
    pub async fn register_phone_number(
        client: &Client,
        phone_number: Option<&str>,
        otp: Option<&str>,
    ) -> Result<User> {
        let body = json!({
            "phone_number": phone_number.map(standardize_phone_number),
            "otp": otp,
        });
        client.post_data("/user/register_phone_number", &body).await
    }

    pub async fn validate_phone_number(client: &Client, otp: &str) -> Result<User> {
        let path = with_query("/user/validate_phone_number", &[("otp", otp.to_string())]);
        client.get_data(&path).await
    }

    /// Sends an OTP over SMS to the account's registered number.
    pub async fn send_sms_otp(
        client: &Client,
        username: &str,
        message_template_name: &str,
    ) -> Result<String> {
        let path = with_query(
            "/user/send_sms_otp",
            &[
                ("username", username.to_string()),
                ("message_template_name", message_template_name.to_string()),
            ],
        );
        client.get_data(&path).await
    }

    pub async fn reset_password(
        client: &Client,
        username: &str,
        new_password: &str,
        otp: &str,
    ) -> Result<String> {
        let body = json!({
            "username": username,
            "new_password": new_password,
            "otp": otp,
        });
        client.post_data("/user/reset_password", &body).await
    }

    /// Provisioning URL to enroll an authenticator app.
    pub async fn mfa_provision_url(client: &Client, otp: Option<&str>) -> Result<String> {
        let provision: MfaProvision = client
            .get_data(&with_otp("/user/mfa/generate", otp))
            .await?;
        Ok(provision.mfa_url)
    }

    pub async fn activate_mfa(client: &Client, otp: &str) -> Result<User> {
        client
            .post_data("/user/mfa/activate", &json!({ "user_otp": otp }))
            .await
    }

    pub async fn disable_mfa(client: &Client, user: Option<&str>, otp: Option<&str>) -> Result<User> {
        let uuid = Self::details(client, user).await?.uuid;
        client
            .delete_data(&with_otp(&format!("/user/mfa/{}/disable", uuid), otp))
            .await
    }

    pub async fn enable_sso(
        client: &Client,
        sso_provider: &str,
        sso_email: &str,
        otp: Option<&str>,
    ) -> Result<String> {
        let body = json!({
            "sso_provider": sso_provider,
            "sso_email": sso_email,
            "otp": otp,
        });
        client.post_data("/user/sso/enable", &body).await
    }

    pub async fn disable_sso(
        client: &Client,
        sso_provider: &str,
        user: Option<&str>,
        otp: Option<&str>,
    ) -> Result<String> {
        let uuid = Self::details(client, user).await?.uuid;
        let path = with_otp(&format!("/user/sso/{}/disable/{}", uuid, sso_provider), otp);
        client.delete_data(&path).await
    }
}
