//! `UniFFI` surface for Swift and Kotlin.
//!
//! The platform implements [`ForeignVault`] over its keychain or keystore and
//! [`ForeignWorkletHost`] over its worklet runtime, then drives everything
//! through one [`WdkSession`].
//!
//! # Example (Swift)
//!
//! ```swift
//! let session = WdkSession(
//!     bundlePath: "wdk.bundle",
//!     bundle: bundleData,
//!     vault: KeychainVault(),
//!     host: BareWorkletHost()
//! )
//!
//! let outcome = try await session.switchToWallet(walletId: "main", config: networksJson)
//! let address = try await session.address(network: "ethereum", accountIndex: 0, walletId: nil)
//! ```

mod error;
mod session;
mod vault;
mod worklet;

pub use error::ForeignError;
pub use session::WdkSession;
pub use vault::ForeignVault;
pub use worklet::{ForeignWorklet, ForeignWorkletHost};
