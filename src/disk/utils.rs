use anyhow::{anyhow, bail, Result};
use dialoguer::Confirm;

use super::error::{PlanError, PlanResult};

/// Parse a size token into KiB. Unit-less values are already KiB.
pub fn parse_size_kb(input: &str) -> PlanResult<u64> {
    let malformed = || PlanError::MalformedSize {
        line: 0,
        field: "size",
        value: input.to_string(),
    };

    let s = input.trim();
    let (num_str, multiplier) = match s.chars().last() {
        Some('g' | 'G') => (&s[..s.len() - 1], 1024u64 * 1024),
        Some('m' | 'M') => (&s[..s.len() - 1], 1024u64),
        Some('k' | 'K') => (&s[..s.len() - 1], 1u64),
        Some(_) => (s, 1u64),
        None => return Err(malformed()),
    };

    if num_str.is_empty() || !num_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let num: u64 = num_str.parse().map_err(|_| malformed())?;
    num.checked_mul(multiplier).ok_or_else(malformed)
}

/// `None` when the aligned value does not fit in a `u64`.
pub fn align_up(value: u64, align: u64) -> Option<u64> {
    if align == 0 {
        return Some(value);
    }
    value.div_ceil(align).checked_mul(align)
}

pub fn confirm_or_yes(yes: bool, prompt: &str) -> Result<()> {
    if yes {
        return Ok(());
    }
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| anyhow!("prompt failed: {e}"))?;
    if confirmed {
        Ok(())
    } else {
        bail!("aborted by user")
    }
}
