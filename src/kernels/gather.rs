//! Embedding lookup (gather): one element per `(token, hidden
//! position)`.

use crate::error::DispatchError;

use super::validate_positive_u32;

pub const OPERATION: &str = "gather";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherVariant {
    Default,
    Vec4,
}

impl GatherVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            GatherVariant::Default => "default",
            GatherVariant::Vec4 => "vec4",
        }
    }
}

/// Vectorized variant used when `hiddenSize % 4 == 0`.
pub fn select_variant(hidden_size: u32) -> GatherVariant {
    if hidden_size % 4 == 0 {
        GatherVariant::Vec4
    } else {
        GatherVariant::Default
    }
}

pub fn validate(num_tokens: u32, hidden_size: u32) -> Result<(), DispatchError> {
    validate_positive_u32(OPERATION, "numTokens", num_tokens)?;
    validate_positive_u32(OPERATION, "hiddenSize", hidden_size)?;
    Ok(())
}

pub fn dispatch_count(num_tokens: u32, hidden_size: u32, variant: GatherVariant, workgroup_size_x: u32) -> u32 {
    let elements = match variant {
        GatherVariant::Vec4 => num_tokens as u64 * (hidden_size as u64 / 4),
        GatherVariant::Default => num_tokens as u64 * hidden_size as u64,
    };
    elements.div_ceil(workgroup_size_x as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec4_selected_when_hidden_size_divides_by_4() {
        assert_eq!(select_variant(512), GatherVariant::Vec4);
        assert_eq!(select_variant(513), GatherVariant::Default);
    }
}
