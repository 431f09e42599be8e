//! Field rules for catalog input. Every entry point trims before checking.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ApiError, ApiResult};

pub const CATEGORY_NAME_LEN: (usize, usize) = (2, 50);
pub const CATEGORY_DESCRIPTION_MAX: usize = 200;
pub const PRODUCT_NAME_LEN: (usize, usize) = (2, 100);
pub const PRODUCT_DESCRIPTION_MAX: usize = 1000;
pub const PRICE_MAX: f64 = 1_000_000.0;

lazy_static! {
    static ref CATEGORY_NAME_RE: Regex = Regex::new(r"^[\p{L}\s]+$").unwrap();
    static ref IMAGE_URL_RE: Regex =
        Regex::new(r"(?i)^https?://\S+\.(?:png|jpg|jpeg|gif|svg|webp)$").unwrap();
}

fn length_between(field: &str, value: &str, (min, max): (usize, usize)) -> ApiResult<()> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(ApiError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

pub fn category_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    length_between("Name", name, CATEGORY_NAME_LEN)?;
    if !CATEGORY_NAME_RE.is_match(name) {
        return Err(ApiError::validation("Name may contain only letters and spaces"));
    }
    Ok(name.to_string())
}

pub fn product_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    length_between("Name", name, PRODUCT_NAME_LEN)?;
    Ok(name.to_string())
}

pub fn description(raw: Option<&str>, max: usize) -> ApiResult<String> {
    let text = raw.unwrap_or_default().trim();
    if text.chars().count() > max {
        return Err(ApiError::validation(format!(
            "Description must be at most {max} characters"
        )));
    }
    Ok(text.to_string())
}

/// Empty, or an http(s) URL to a png, jpg, jpeg, gif, svg or webp file.
pub fn image(raw: Option<&str>) -> ApiResult<String> {
    let url = raw.unwrap_or_default().trim();
    if !url.is_empty() && !IMAGE_URL_RE.is_match(url) {
        return Err(ApiError::validation("Enter a valid image URL"));
    }
    Ok(url.to_string())
}

pub fn price(value: f64) -> ApiResult<f64> {
    if !value.is_finite() || !(0.0..=PRICE_MAX).contains(&value) {
        return Err(ApiError::validation("Price must be between 0 and 1000000"));
    }
    Ok(value)
}
