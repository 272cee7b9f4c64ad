//! Revert payload decoding.
//!
//! Maps the ABI-encoded error data returned by a failed call to a
//! [`RevertReason`]. Standard `Error(string)` and `Panic(uint256)` payloads are
//! decoded first, then the custom errors declared by the Gbese contracts and
//! their OpenZeppelin bases. Unknown selectors keep the raw bytes.

use std::fmt;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::{Panic, Revert, SolError};
use serde::{Deserialize, Serialize};

sol! {
    error ERC20InsufficientBalance(address sender, uint256 balance, uint256 needed);
    error ERC20InsufficientAllowance(address spender, uint256 allowance, uint256 needed);
    error ERC20InvalidApprover(address approver);
    error ERC20InvalidReceiver(address receiver);
    error ERC20InvalidSender(address sender);
    error ERC20InvalidSpender(address spender);
    error OwnableUnauthorizedAccount(address account);
    error OwnableInvalidOwner(address owner);
    error ECDSAInvalidSignature();
    error ECDSAInvalidSignatureLength(uint256 length);
    error ECDSAInvalidSignatureS(bytes32 s);
}

/// Decoded reason for an on-chain rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevertReason {
    /// `require`/`revert` with a string message
    Message { message: String },
    /// Solidity panic code (assert, overflow, ...)
    Panic { code: U256 },
    InsufficientBalance {
        sender: Address,
        balance: U256,
        needed: U256,
    },
    InsufficientAllowance {
        spender: Address,
        allowance: U256,
        needed: U256,
    },
    InvalidApprover { approver: Address },
    InvalidReceiver { receiver: Address },
    InvalidSender { sender: Address },
    InvalidSpender { spender: Address },
    UnauthorizedAccount { account: Address },
    InvalidOwner { owner: Address },
    InvalidSignature,
    InvalidSignatureLength { length: U256 },
    InvalidSignatureS { s: B256 },
    /// Empty revert data (`revert()` without reason)
    Empty,
    /// Selector not in the known set
    Unknown { selector: [u8; 4], data: Bytes },
}

/// Coarse classification of a revert, used for control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    InsufficientBalance,
    InsufficientAllowance,
    KycNotVerified,
    StaleAttestation,
    WrongSigner,
    InvalidSignature,
    Unauthorized,
    InvalidArgument,
    Panic,
    Other,
}

impl RevertReason {
    /// Decode raw revert data.
    pub fn decode(data: &[u8]) -> Self {
        if data.is_empty() {
            return RevertReason::Empty;
        }
        let Some(selector) = data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok()) else {
            return RevertReason::Unknown {
                selector: [0; 4],
                data: Bytes::copy_from_slice(data),
            };
        };

        let decoded = if selector == Revert::SELECTOR {
            try_decode(data, |r: Revert| RevertReason::Message { message: r.reason })
        } else if selector == Panic::SELECTOR {
            try_decode(data, |p: Panic| RevertReason::Panic { code: p.code })
        } else if selector == ERC20InsufficientBalance::SELECTOR {
            try_decode(data, |e: ERC20InsufficientBalance| {
                RevertReason::InsufficientBalance {
                    sender: e.sender,
                    balance: e.balance,
                    needed: e.needed,
                }
            })
        } else if selector == ERC20InsufficientAllowance::SELECTOR {
            try_decode(data, |e: ERC20InsufficientAllowance| {
                RevertReason::InsufficientAllowance {
                    spender: e.spender,
                    allowance: e.allowance,
                    needed: e.needed,
                }
            })
        } else if selector == ERC20InvalidApprover::SELECTOR {
            try_decode(data, |e: ERC20InvalidApprover| RevertReason::InvalidApprover {
                approver: e.approver,
            })
        } else if selector == ERC20InvalidReceiver::SELECTOR {
            try_decode(data, |e: ERC20InvalidReceiver| RevertReason::InvalidReceiver {
                receiver: e.receiver,
            })
        } else if selector == ERC20InvalidSender::SELECTOR {
            try_decode(data, |e: ERC20InvalidSender| RevertReason::InvalidSender {
                sender: e.sender,
            })
        } else if selector == ERC20InvalidSpender::SELECTOR {
            try_decode(data, |e: ERC20InvalidSpender| RevertReason::InvalidSpender {
                spender: e.spender,
            })
        } else if selector == OwnableUnauthorizedAccount::SELECTOR {
            try_decode(data, |e: OwnableUnauthorizedAccount| {
                RevertReason::UnauthorizedAccount { account: e.account }
            })
        } else if selector == OwnableInvalidOwner::SELECTOR {
            try_decode(data, |e: OwnableInvalidOwner| RevertReason::InvalidOwner {
                owner: e.owner,
            })
        } else if selector == ECDSAInvalidSignature::SELECTOR {
            Some(RevertReason::InvalidSignature)
        } else if selector == ECDSAInvalidSignatureLength::SELECTOR {
            try_decode(data, |e: ECDSAInvalidSignatureLength| {
                RevertReason::InvalidSignatureLength { length: e.length }
            })
        } else if selector == ECDSAInvalidSignatureS::SELECTOR {
            try_decode(data, |e: ECDSAInvalidSignatureS| RevertReason::InvalidSignatureS {
                s: e.s,
            })
        } else {
            None
        };

        decoded.unwrap_or_else(|| RevertReason::Unknown {
            selector,
            data: Bytes::copy_from_slice(data),
        })
    }

    /// Build a reason from a node error message when no revert data was returned,
    /// e.g. `execution reverted: KYC not verified`.
    pub fn from_message(message: &str) -> Self {
        let trimmed = message
            .trim()
            .strip_prefix("execution reverted")
            .map(|rest| rest.trim_start_matches(':').trim())
            .unwrap_or_else(|| message.trim());
        if trimmed.is_empty() {
            RevertReason::Empty
        } else {
            RevertReason::Message {
                message: trimmed.to_string(),
            }
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        RevertReason::Message {
            message: message.into(),
        }
    }

    /// ABI-encode this reason back into revert data.
    ///
    /// `Unknown` returns its raw payload unchanged. Used by chain simulators.
    pub fn encode(&self) -> Bytes {
        let bytes = match self {
            RevertReason::Message { message } => Revert {
                reason: message.clone(),
            }
            .abi_encode(),
            RevertReason::Panic { code } => Panic { code: *code }.abi_encode(),
            RevertReason::InsufficientBalance {
                sender,
                balance,
                needed,
            } => ERC20InsufficientBalance {
                sender: *sender,
                balance: *balance,
                needed: *needed,
            }
            .abi_encode(),
            RevertReason::InsufficientAllowance {
                spender,
                allowance,
                needed,
            } => ERC20InsufficientAllowance {
                spender: *spender,
                allowance: *allowance,
                needed: *needed,
            }
            .abi_encode(),
            RevertReason::InvalidApprover { approver } => ERC20InvalidApprover {
                approver: *approver,
            }
            .abi_encode(),
            RevertReason::InvalidReceiver { receiver } => ERC20InvalidReceiver {
                receiver: *receiver,
            }
            .abi_encode(),
            RevertReason::InvalidSender { sender } => {
                ERC20InvalidSender { sender: *sender }.abi_encode()
            }
            RevertReason::InvalidSpender { spender } => {
                ERC20InvalidSpender { spender: *spender }.abi_encode()
            }
            RevertReason::UnauthorizedAccount { account } => {
                OwnableUnauthorizedAccount { account: *account }.abi_encode()
            }
            RevertReason::InvalidOwner { owner } => {
                OwnableInvalidOwner { owner: *owner }.abi_encode()
            }
            RevertReason::InvalidSignature => ECDSAInvalidSignature {}.abi_encode(),
            RevertReason::InvalidSignatureLength { length } => {
                ECDSAInvalidSignatureLength { length: *length }.abi_encode()
            }
            RevertReason::InvalidSignatureS { s } => ECDSAInvalidSignatureS { s: *s }.abi_encode(),
            RevertReason::Empty => Vec::new(),
            RevertReason::Unknown { data, .. } => data.to_vec(),
        };
        Bytes::from(bytes)
    }

    pub fn kind(&self) -> RejectionKind {
        match self {
            RevertReason::Message { message } => classify_message(message),
            RevertReason::Panic { .. } => RejectionKind::Panic,
            RevertReason::InsufficientBalance { .. } => RejectionKind::InsufficientBalance,
            RevertReason::InsufficientAllowance { .. } => RejectionKind::InsufficientAllowance,
            RevertReason::InvalidApprover { .. }
            | RevertReason::InvalidReceiver { .. }
            | RevertReason::InvalidSender { .. }
            | RevertReason::InvalidSpender { .. } => RejectionKind::InvalidArgument,
            RevertReason::UnauthorizedAccount { .. } | RevertReason::InvalidOwner { .. } => {
                RejectionKind::Unauthorized
            }
            RevertReason::InvalidSignature
            | RevertReason::InvalidSignatureLength { .. }
            | RevertReason::InvalidSignatureS { .. } => RejectionKind::InvalidSignature,
            RevertReason::Empty | RevertReason::Unknown { .. } => RejectionKind::Other,
        }
    }
}

fn try_decode<E: SolError>(
    data: &[u8],
    map: impl FnOnce(E) -> RevertReason,
) -> Option<RevertReason> {
    E::abi_decode(data, true).ok().map(map)
}

/// Keyword classification of `require` messages. Order matters: "KYC expired"
/// is stale, "invalid signer" is a signer mismatch, not a malformed signature.
fn classify_message(message: &str) -> RejectionKind {
    let m = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| m.contains(n));

    if has(&["expired", "stale", "too old", "outdated"]) {
        RejectionKind::StaleAttestation
    } else if has(&["issuer", "signer"]) {
        RejectionKind::WrongSigner
    } else if has(&["signature"]) {
        RejectionKind::InvalidSignature
    } else if has(&["kyc", "not verified"]) {
        RejectionKind::KycNotVerified
    } else if has(&["allowance"]) {
        RejectionKind::InsufficientAllowance
    } else if has(&["balance"]) {
        RejectionKind::InsufficientBalance
    } else if has(&["owner", "unauthorized", "not allowed", "access"]) {
        RejectionKind::Unauthorized
    } else {
        RejectionKind::Other
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevertReason::Message { message } => write!(f, "{message}"),
            RevertReason::Panic { code } => write!(f, "panic (code {code:#x})"),
            RevertReason::InsufficientBalance {
                sender,
                balance,
                needed,
            } => write!(
                f,
                "insufficient balance: {sender} holds {balance}, needs {needed}"
            ),
            RevertReason::InsufficientAllowance {
                spender,
                allowance,
                needed,
            } => write!(
                f,
                "insufficient allowance: {spender} may spend {allowance}, needs {needed}"
            ),
            RevertReason::InvalidApprover { approver } => write!(f, "invalid approver {approver}"),
            RevertReason::InvalidReceiver { receiver } => write!(f, "invalid receiver {receiver}"),
            RevertReason::InvalidSender { sender } => write!(f, "invalid sender {sender}"),
            RevertReason::InvalidSpender { spender } => write!(f, "invalid spender {spender}"),
            RevertReason::UnauthorizedAccount { account } => {
                write!(f, "unauthorized account {account}")
            }
            RevertReason::InvalidOwner { owner } => write!(f, "invalid owner {owner}"),
            RevertReason::InvalidSignature => write!(f, "invalid signature"),
            RevertReason::InvalidSignatureLength { length } => {
                write!(f, "invalid signature length {length}")
            }
            RevertReason::InvalidSignatureS { s } => write!(f, "invalid signature s value {s}"),
            RevertReason::Empty => write!(f, "reverted without a reason"),
            RevertReason::Unknown { selector, data } => write!(
                f,
                "unknown error 0x{} ({} bytes: {})",
                hex::encode(selector),
                data.len(),
                data
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_decode_error_string() {
        let data = Revert {
            reason: "KYC not verified".to_string(),
        }
        .abi_encode();

        let reason = RevertReason::decode(&data);
        assert_eq!(reason, RevertReason::message("KYC not verified"));
        assert_eq!(reason.kind(), RejectionKind::KycNotVerified);
        assert_eq!(reason.to_string(), "KYC not verified");
    }

    #[test]
    fn test_decode_insufficient_balance() {
        let buyer = address!("2222222222222222222222222222222222222222");
        let data = ERC20InsufficientBalance {
            sender: buyer,
            balance: U256::from(50),
            needed: U256::from(100),
        }
        .abi_encode();

        let reason = RevertReason::decode(&data);
        assert_eq!(reason.kind(), RejectionKind::InsufficientBalance);
        assert!(reason.to_string().contains("holds 50, needs 100"));
    }

    #[test]
    fn test_decode_ecdsa_errors() {
        let data = ECDSAInvalidSignature {}.abi_encode();
        assert_eq!(RevertReason::decode(&data), RevertReason::InvalidSignature);

        let data = ECDSAInvalidSignatureLength {
            length: U256::from(64),
        }
        .abi_encode();
        assert_eq!(
            RevertReason::decode(&data).kind(),
            RejectionKind::InvalidSignature
        );
    }

    #[test]
    fn test_decode_unknown_selector_keeps_payload() {
        let data = [0xde, 0xad, 0xbe, 0xef, 0x01, 0x02];
        match RevertReason::decode(&data) {
            RevertReason::Unknown { selector, data } => {
                assert_eq!(selector, [0xde, 0xad, 0xbe, 0xef]);
                assert_eq!(data.len(), 6);
            }
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_truncated_known_selector() {
        // Valid selector but missing arguments
        let data = ERC20InsufficientBalance::SELECTOR;
        assert!(matches!(
            RevertReason::decode(&data),
            RevertReason::Unknown { .. }
        ));
    }

    #[test]
    fn test_decode_short_and_empty() {
        assert_eq!(RevertReason::decode(&[]), RevertReason::Empty);
        assert!(matches!(
            RevertReason::decode(&[0x01, 0x02]),
            RevertReason::Unknown { .. }
        ));
    }

    #[test]
    fn test_from_node_message() {
        assert_eq!(
            RevertReason::from_message("execution reverted: Insufficient balance"),
            RevertReason::message("Insufficient balance")
        );
        assert_eq!(
            RevertReason::from_message("execution reverted"),
            RevertReason::Empty
        );
    }

    #[test]
    fn test_message_classification_order() {
        assert_eq!(
            RevertReason::message("KYC expired").kind(),
            RejectionKind::StaleAttestation
        );
        assert_eq!(
            RevertReason::message("Invalid signer").kind(),
            RejectionKind::WrongSigner
        );
        assert_eq!(
            RevertReason::message("Invalid signature").kind(),
            RejectionKind::InvalidSignature
        );
        assert_eq!(
            RevertReason::message("ERC20: insufficient allowance").kind(),
            RejectionKind::InsufficientAllowance
        );
        assert_eq!(
            RevertReason::message("Ownable: caller is not the owner").kind(),
            RejectionKind::Unauthorized
        );
    }

    #[test]
    fn test_encode_decode_custom_error() {
        let reason = RevertReason::UnauthorizedAccount {
            account: address!("3333333333333333333333333333333333333333"),
        };
        assert_eq!(RevertReason::decode(&reason.encode()), reason);
    }
}
