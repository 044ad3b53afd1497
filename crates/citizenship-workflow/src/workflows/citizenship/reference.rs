use super::domain::ApplicationCategory;

/// Human-readable reference such as `SPK-BH-2026-00001`.
///
/// `sequence` is 1-based within the category and calendar year.
pub fn reference_number(
    prefix: &str,
    category: ApplicationCategory,
    year: i32,
    sequence: usize,
) -> String {
    format!(
        "{prefix}-{code}-{year}-{sequence:05}",
        code = category.reference_code()
    )
}
