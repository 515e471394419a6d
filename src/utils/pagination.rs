use serde::{Deserialize, Serialize};

use crate::utils::errors::AppError;

pub const PAGE_SIZE: i64 = 15;

/// `?page=` for list endpoints. Missing means page 1.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
}

impl Page {
    pub fn limit(&self) -> i64 {
        PAGE_SIZE
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * PAGE_SIZE
    }
}

impl PageParams {
    pub fn resolve(self) -> Result<Page, AppError> {
        resolve_page(self.page)
    }
}

pub fn resolve_page(page: Option<i64>) -> Result<Page, AppError> {
    let number = page.unwrap_or(1);
    if number < 1 {
        return Err(AppError::BadRequest(
            "Page number must be greater than 0".to_string(),
        ));
    }
    if (number - 1).checked_mul(PAGE_SIZE).is_none() {
        return Err(AppError::BadRequest(format!("Page number {number} is too large")));
    }
    Ok(Page { number })
}

/// `{ total, batch }` envelope returned by every paginated list.
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub total: i64,
    pub batch: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_page_defaults_to_first() {
        let page = resolve_page(None).unwrap();
        assert_eq!(page.number, 1);
        assert_eq!(page.offset(), 0);
        assert_eq!(page.limit(), 15);
    }

    #[test]
    fn offset_advances_by_page_size() {
        assert_eq!(resolve_page(Some(3)).unwrap().offset(), 30);
    }

    #[test]
    fn pages_past_the_addressable_offset_are_rejected() {
        assert!(matches!(resolve_page(Some(i64::MAX)), Err(AppError::BadRequest(_))));

        let last = i64::MAX / PAGE_SIZE + 1;
        assert_eq!(resolve_page(Some(last)).unwrap().offset(), (last - 1) * PAGE_SIZE);
        assert!(resolve_page(Some(last + 1)).is_err());
    }

    #[test]
    fn zero_and_negative_pages_are_rejected() {
        assert!(matches!(resolve_page(Some(0)), Err(AppError::BadRequest(_))));
        assert!(matches!(resolve_page(Some(-4)), Err(AppError::BadRequest(_))));
    }
}
