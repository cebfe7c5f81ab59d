//! Form cleaning: turns submitted forms into values that are safe to persist.
//!
//! Failures come back as `AppError::Validation`, which handlers answer with the
//! field errors and the untouched submission.

use std::borrow::Cow;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::entities::{group, user};
use crate::error::{AppError, AppResult};
use crate::schema::{CommentForm, FieldError, PostForm, SignupForm};

/// Width of the `posts.image` column.
pub const IMAGE_PATH_MAX_LENGTH: usize = 100;

const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "webp"];

static USERNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w.@+-]+\z").expect("username pattern compiles")
});

/// A post form that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanPost {
    pub text: String,
    pub group_id: Option<i32>,
    pub image: Option<String>,
}

pub fn field_error(code: &'static str, message: String) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Owned(message));
    error
}

/// Checks the post text against the minimum length. Length counts characters after
/// surrounding whitespace is stripped.
pub fn validate_post_text(text: &str, min_length: usize) -> Result<(), ValidationError> {
    let length = text.trim().chars().count();
    if length == 0 {
        return Err(field_error("required", "This field is required.".to_string()));
    }
    if length < min_length {
        return Err(field_error(
            "min_length",
            format!("Ensure this value has at least {min_length} characters (it has {length})."),
        ));
    }
    Ok(())
}

/// Checks a stored image path: it has to fit the column and name an image file.
pub fn validate_image_path(path: &str) -> Result<(), ValidationError> {
    let length = path.chars().count();
    if length > IMAGE_PATH_MAX_LENGTH {
        return Err(field_error(
            "max_length",
            format!(
                "Ensure this filename has at most {IMAGE_PATH_MAX_LENGTH} characters (it has {length})."
            ),
        ));
    }
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(field_error(
            "invalid_image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image."
                .to_string(),
        )),
    }
}

/// Letters, digits and `@ . + - _` only.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME.is_match(username) {
        Ok(())
    } else {
        Err(field_error(
            "invalid",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        ))
    }
}

pub async fn clean_post<C: ConnectionTrait>(
    db: &C,
    form: &PostForm,
    min_length: usize,
) -> AppResult<CleanPost> {
    let mut errors = ValidationErrors::new();
    if let Err(error) = validate_post_text(&form.text, min_length) {
        errors.add("text", error);
    }
    let image = form
        .image
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty());
    if let Some(Err(error)) = image.map(validate_image_path) {
        errors.add("image", error);
    }
    if let Some(group_id) = form.group {
        if group::Entity::find_by_id(group_id).one(db).await?.is_none() {
            errors.add(
                "group",
                field_error(
                    "invalid_choice",
                    "Select a valid choice. That choice is not one of the available choices."
                        .to_string(),
                ),
            );
        }
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    Ok(CleanPost {
        text: form.text.trim().to_owned(),
        group_id: form.group,
        image: image.map(str::to_owned),
    })
}

/// Returns the stripped comment text.
pub fn clean_comment(form: &CommentForm) -> AppResult<String> {
    let text = form.text.trim();
    if text.is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "text",
            field_error("required", "A comment cannot be empty.".to_string()),
        );
        return Err(AppError::Validation(errors));
    }
    Ok(text.to_owned())
}

/// Field rules from the form itself plus a free username.
pub async fn clean_signup<C: ConnectionTrait>(db: &C, form: &SignupForm) -> AppResult<()> {
    let mut errors = form.validate().err().unwrap_or_default();
    if !form.username.is_empty() {
        if let Err(error) = validate_username(&form.username) {
            errors.add("username", error);
        }
    }
    let taken = user::Entity::find()
        .filter(user::Column::Username.eq(form.username.as_str()))
        .count(db)
        .await?;
    if taken > 0 {
        errors.add(
            "username",
            field_error("unique", "A user with that username already exists.".to_string()),
        );
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Flattens validator output into the response shape, sorted by field name.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| FieldError {
            field: field.to_string(),
            messages: errs
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => e.code.to_string(),
                })
                .collect(),
        })
        .collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn post_form(text: &str, group: Option<i32>) -> PostForm {
        PostForm {
            text: text.to_string(),
            group,
            image: None,
        }
    }

    #[test]
    fn short_text_is_rejected() {
        let err = validate_post_text(&"a".repeat(99), 100).unwrap_err();
        assert_eq!(err.code, "min_length");
        assert!(validate_post_text(&"a".repeat(100), 100).is_ok());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(validate_post_text(&"я".repeat(100), 100).is_ok());
        assert!(validate_post_text(&"я".repeat(60), 100).is_err());
    }

    #[test]
    fn padding_does_not_count() {
        let padded = format!("   {}   ", "a".repeat(98));
        assert!(validate_post_text(&padded, 100).is_err());
    }

    #[test]
    fn blank_comment_is_rejected() {
        let err = clean_comment(&CommentForm { text: "  \n".into() }).unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields = field_errors(&errors);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field, "text");
    }

    #[test]
    fn comment_is_stripped() {
        let text = clean_comment(&CommentForm { text: " nice post ".into() }).unwrap();
        assert_eq!(text, "nice post");
    }

    #[tokio::test]
    async fn unknown_group_is_a_field_error() {
        let db = testing::db().await;
        let err = clean_post(&db, &post_form(&testing::long_text("x"), Some(42)), 100)
            .await
            .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields = field_errors(&errors);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field, "group");
    }

    #[tokio::test]
    async fn both_fields_reported_together() {
        let db = testing::db().await;
        let err = clean_post(&db, &post_form("short", Some(42)), 100)
            .await
            .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = field_errors(&errors).into_iter().map(|f| f.field).collect();
        assert_eq!(fields, ["group", "text"]);
    }

    fn signup(username: &str, password: &str) -> SignupForm {
        SignupForm {
            first_name: "Leo".into(),
            last_name: "Tolstoy".into(),
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn signup_rejects_taken_username_and_short_password() {
        let db = testing::db().await;
        testing::user(&db, "leo").await;

        let err = clean_signup(&db, &signup("leo", "short")).await.unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = field_errors(&errors).into_iter().map(|f| f.field).collect();
        assert_eq!(fields, ["password", "username"]);

        assert!(clean_signup(&db, &signup("ann", "long enough")).await.is_ok());
    }

    #[test]
    fn image_paths_must_fit_and_be_images() {
        assert!(validate_image_path("posts/cat.gif").is_ok());
        assert!(validate_image_path("posts/CAT.JPEG").is_ok());
        assert_eq!(validate_image_path("posts/notes.txt").unwrap_err().code, "invalid_image");
        assert_eq!(validate_image_path("posts/noext").unwrap_err().code, "invalid_image");

        let long = format!("posts/{}.png", "a".repeat(95));
        assert_eq!(validate_image_path(&long).unwrap_err().code, "max_length");
    }

    #[tokio::test]
    async fn bad_image_is_a_field_error() {
        let db = testing::db().await;
        let mut form = post_form(&testing::long_text("x"), None);
        form.image = Some(format!("posts/{}.gif", "a".repeat(200)));
        let err = clean_post(&db, &form, 100).await.unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = field_errors(&errors).into_iter().map(|f| f.field).collect();
        assert_eq!(fields, ["image"]);
    }

    #[test]
    fn usernames_are_url_safe() {
        for ok in ["leo", "leo.tolstoy", "l+e@o-_1", "лев"] {
            assert!(validate_username(ok).is_ok(), "{ok}");
        }
        for bad in ["bad name", "a/b", "who?", "x#y", "leo\n"] {
            assert!(validate_username(bad).is_err(), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn signup_rejects_usernames_with_path_characters() {
        let db = testing::db().await;
        let err = clean_signup(&db, &signup("bad name/x", "long enough"))
            .await
            .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = field_errors(&errors).into_iter().map(|f| f.field).collect();
        assert_eq!(fields, ["username"]);
    }

    #[tokio::test]
    async fn valid_post_is_cleaned() {
        let db = testing::db().await;
        let group = testing::group(&db, "cats").await;
        let mut form = post_form(&testing::long_text("x"), Some(group.id));
        form.image = Some("  ".into());
        let clean = clean_post(&db, &form, 100).await.unwrap();
        assert_eq!(clean.group_id, Some(group.id));
        assert_eq!(clean.image, None);

        form.image = Some(" posts/cat.png ".into());
        let clean = clean_post(&db, &form, 100).await.unwrap();
        assert_eq!(clean.image.as_deref(), Some("posts/cat.png"));
    }
}
