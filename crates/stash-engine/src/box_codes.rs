use stash_core::{Error as CoreError, format_box_code, parse_box_code};
use stash_storage::{Result, Storage};

/// Check a box code typed or scanned by the user. Returns the numeric code
/// when it is well formed and not used by any box yet.
pub async fn validate_new_box_code(storage: &Storage, input: &str) -> Result<i64> {
    let code = parse_box_code(input.trim())?;
    if storage.has_box_with_code(code).await? {
        return Err(CoreError::BoxCodeInUse(format_box_code(code)).into());
    }
    Ok(code)
}
