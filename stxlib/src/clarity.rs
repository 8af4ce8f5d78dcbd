//! Coercion of user input into Clarity values for contract calls.

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Argument type declared in a contract's ABI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClarityAbiType {
    /// `bool`
    Bool,
    /// `int128`
    Int128,
    /// `uint128`
    Uint128,
    /// `principal`
    Principal,
    /// `(buff length)`
    Buffer {
        /// Maximum length in bytes
        length: u32,
    },
    /// Any other type, kept as its type string.
    Unsupported(String),
}

impl ClarityAbiType {
    /// Reads a type from the JSON of a contract interface, for example `"uint128"` or `{"buffer": {"length": 32}}`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(name) => match name.as_str() {
                "bool" => Self::Bool,
                "int128" => Self::Int128,
                "uint128" => Self::Uint128,
                "principal" => Self::Principal,
                other => Self::Unsupported(other.to_string()),
            },
            serde_json::Value::Object(map) => match map.get("buffer").and_then(|buffer| buffer.get("length")) {
                Some(length) => match length.as_u64().and_then(|length| u32::try_from(length).ok()) {
                    Some(length) => Self::Buffer { length },
                    None => Self::Unsupported(value.to_string()),
                },
                None => Self::Unsupported(
                    map.keys()
                        .next()
                        .cloned()
                        .unwrap_or_else(|| value.to_string()),
                ),
            },
            other => Self::Unsupported(other.to_string()),
        }
    }
}

impl std::fmt::Display for ClarityAbiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int128 => write!(f, "int"),
            Self::Uint128 => write!(f, "uint"),
            Self::Principal => write!(f, "principal"),
            Self::Buffer { length } => write!(f, "(buff {length})"),
            Self::Unsupported(name) => write!(f, "{name}"),
        }
    }
}

/// A named function argument of a contract's ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionArg {
    /// Argument name
    pub name: String,
    /// Declared type
    pub abi_type: ClarityAbiType,
}

impl FunctionArg {
    /// Creates a function argument.
    pub fn new(name: impl Into<String>, abi_type: ClarityAbiType) -> Self {
        Self {
            name: name.into(),
            abi_type,
        }
    }
}

/// A Clarity value passed to a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ClarityValue {
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i128),
    /// Unsigned integer
    UInt(u128),
    /// Standard principal
    StandardPrincipal(String),
    /// Byte buffer
    Buffer(Vec<u8>),
}

/// Coerces `input` into a value of the argument's declared type.
///
/// Booleans are true only for the exact input `True`. Buffers hold the UTF-8 bytes of the input.
///
/// # Examples
///
/// ```
/// use stxlib::clarity::{ClarityAbiType, ClarityValue, FunctionArg, coerce_argument};
///
/// let amount = FunctionArg::new("amount", ClarityAbiType::Uint128);
/// assert_eq!(coerce_argument("100", &amount), Ok(ClarityValue::UInt(100)));
/// assert!(coerce_argument("-1", &amount).is_err());
///
/// let flag = FunctionArg::new("flag", ClarityAbiType::Bool);
/// assert_eq!(coerce_argument("true", &flag), Ok(ClarityValue::Bool(false)));
/// ```
pub fn coerce_argument(input: &str, arg: &FunctionArg) -> Result<ClarityValue, BuildError> {
    let invalid = || BuildError::InvalidArgument {
        name: arg.name.clone(),
        expected: arg.abi_type.to_string(),
        input: input.to_string(),
    };

    match &arg.abi_type {
        ClarityAbiType::Bool => Ok(ClarityValue::Bool(input == "True")),
        ClarityAbiType::Int128 => input
            .trim()
            .parse::<i128>()
            .map(ClarityValue::Int)
            .map_err(|_| invalid()),
        ClarityAbiType::Uint128 => input
            .trim()
            .parse::<u128>()
            .map(ClarityValue::UInt)
            .map_err(|_| invalid()),
        ClarityAbiType::Principal => {
            let principal = input.trim();
            if is_standard_principal(principal) {
                Ok(ClarityValue::StandardPrincipal(principal.to_string()))
            } else {
                Err(invalid())
            }
        }
        ClarityAbiType::Buffer { length } => {
            let bytes = input.as_bytes();
            if bytes.len() > *length as usize {
                return Err(BuildError::BufferTooLong {
                    name: arg.name.clone(),
                    length: *length,
                });
            }
            Ok(ClarityValue::Buffer(bytes.to_vec()))
        }
        ClarityAbiType::Unsupported(name) => Err(BuildError::UnsupportedAbiType(name.clone())),
    }
}

/// Coerces one input per argument, in order.
pub fn coerce_arguments(
    inputs: &[String],
    args: &[FunctionArg],
) -> Result<Vec<ClarityValue>, BuildError> {
    if inputs.len() != args.len() {
        return Err(BuildError::ArgumentCount {
            expected: args.len(),
            actual: inputs.len(),
        });
    }
    inputs
        .iter()
        .zip(args)
        .map(|(input, arg)| coerce_argument(input, arg))
        .collect()
}

// c32 addresses: 'S', a version character and 38 to 39 c32 characters
fn is_standard_principal(principal: &str) -> bool {
    const C32_ALPHABET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

    let mut chars = principal.chars();
    chars.next() == Some('S')
        && (28..=41).contains(&principal.len())
        && chars.all(|c| C32_ALPHABET.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRINCIPAL: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";

    #[test]
    fn abi_types_from_contract_interface() {
        let types: Vec<ClarityAbiType> = serde_json::from_str::<Vec<serde_json::Value>>(
            r#"["bool", "int128", "uint128", "principal", {"buffer": {"length": 34}},
                {"optional": "uint128"}, "trait_reference"]"#,
        )
        .unwrap()
        .iter()
        .map(ClarityAbiType::from_json)
        .collect();

        assert_eq!(
            types,
            vec![
                ClarityAbiType::Bool,
                ClarityAbiType::Int128,
                ClarityAbiType::Uint128,
                ClarityAbiType::Principal,
                ClarityAbiType::Buffer { length: 34 },
                ClarityAbiType::Unsupported("optional".to_string()),
                ClarityAbiType::Unsupported("trait_reference".to_string()),
            ]
        );
    }

    #[test]
    fn coerces_supported_types() {
        let args = vec![
            FunctionArg::new("flag", ClarityAbiType::Bool),
            FunctionArg::new("delta", ClarityAbiType::Int128),
            FunctionArg::new("recipient", ClarityAbiType::Principal),
            FunctionArg::new("memo", ClarityAbiType::Buffer { length: 8 }),
        ];
        let inputs = ["True", "-42", PRINCIPAL, "hello"].map(String::from);

        assert_eq!(
            coerce_arguments(&inputs, &args).unwrap(),
            vec![
                ClarityValue::Bool(true),
                ClarityValue::Int(-42),
                ClarityValue::StandardPrincipal(PRINCIPAL.to_string()),
                ClarityValue::Buffer(b"hello".to_vec()),
            ]
        );
    }

    #[test]
    fn rejects_mismatched_input() {
        let recipient = FunctionArg::new("recipient", ClarityAbiType::Principal);
        assert!(matches!(
            coerce_argument("ST1.contract", &recipient),
            Err(BuildError::InvalidArgument { .. })
        ));

        let memo = FunctionArg::new("memo", ClarityAbiType::Buffer { length: 2 });
        assert_eq!(
            coerce_argument("abc", &memo),
            Err(BuildError::BufferTooLong {
                name: "memo".to_string(),
                length: 2
            })
        );

        let tuple = FunctionArg::new("pair", ClarityAbiType::Unsupported("tuple".to_string()));
        assert_eq!(
            coerce_argument("{}", &tuple),
            Err(BuildError::UnsupportedAbiType("tuple".to_string()))
        );

        assert_eq!(
            coerce_arguments(&[], &[recipient]),
            Err(BuildError::ArgumentCount {
                expected: 1,
                actual: 0
            })
        );
    }
}
