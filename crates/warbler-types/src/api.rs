use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// -- Session --

/// Claims carried by the `curr_user` session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SignupForm {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub image_url: Option<String>,
}

impl SignupForm {
    /// Strip surrounding whitespace so a blank username fails validation.
    pub fn trimmed(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_string();
        self
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// Edit-profile form. `password` is the current password, checked before
/// anything is written.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UserEditForm {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub image_url: Option<String>,
    pub header_image_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl UserEditForm {
    pub fn trimmed(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_string();
        self
    }
}

// -- Messages --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct MessageForm {
    #[validate(length(min = 1, message = "Message text is required"))]
    pub text: String,
}

impl MessageForm {
    pub fn trimmed(mut self) -> Self {
        self.text = self.text.trim().to_string();
        self
    }
}

/// Treat an empty or whitespace-only form value as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_form_rejects_short_password_and_bad_email() {
        let form = SignupForm {
            username: "testuser".into(),
            email: "not-an-email".into(),
            password: "abc".into(),
            image_url: None,
        };
        let errors = form.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(!fields.contains_key("username"));
    }

    #[test]
    fn signup_form_accepts_valid_input() {
        let form = SignupForm {
            username: "testuser".into(),
            email: "test@test.com".into(),
            password: "testuser".into(),
            image_url: Some(String::new()),
        };
        assert!(form.validate().is_ok());
    }

    #[test]
    fn blank_username_and_message_fail_once_trimmed() {
        let form = SignupForm {
            username: "   ".into(),
            email: " test@test.com ".into(),
            password: "testuser".into(),
            image_url: None,
        }
        .trimmed();
        assert_eq!(form.email, "test@test.com");
        let errors = form.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("username"));
        assert!(!errors.field_errors().contains_key("email"));

        let edit = UserEditForm {
            username: "\t".into(),
            email: "test@test.com".into(),
            password: "testuser".into(),
            ..Default::default()
        }
        .trimmed();
        assert!(edit.validate().unwrap_err().field_errors().contains_key("username"));

        let msg = MessageForm { text: " \n ".into() }.trimmed();
        assert!(msg.validate().is_err());
        let msg = MessageForm { text: "  hi ".into() }.trimmed();
        assert_eq!(msg.text, "hi");
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn non_empty_drops_blank_values() {
        assert_eq!(non_empty(Some("   ".into())), None);
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some(" Tokyo ".into())), Some("Tokyo".to_string()));
    }
}
