//! Threshold signature collection for manual relay
//!
//! Home -> Foreign messages can be executed on Foreign without the oracle by
//! supplying the validators' signatures over the message hash. The Home AMB
//! announces completion with `CollectedSignatures` and serves each signature
//! by index.
//!
//! ## Wire format
//!
//! `executeSignatures` expects the signatures grouped by component, not
//! interleaved:
//!
//! ```text
//! [N: 1 byte][v_1 .. v_N: N bytes][r_1 .. r_N: N * 32 bytes][s_1 .. s_N: N * 32 bytes]
//! ```

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolEvent;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::chain::{call_contract, ChainHandle, LogQuery};
use crate::error::{RelayError, RelayResult};
use crate::evm::contracts::IHomeAmb;
use crate::evm::events::decode_collected_signatures;
use crate::poll::{PollOutcome, PollPolicy, Poller};
use crate::types::MessageHash;

/// Length of a serialized `r || s || v` signature
pub const SIGNATURE_LEN: usize = 65;

/// One validator's ECDSA signature over a message hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl Signature {
    /// Split a 65-byte signature: r = bytes 0..32, s = 32..64, v = last byte
    pub fn from_bytes(index: usize, bytes: &[u8]) -> RelayResult<Self> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(RelayError::MalformedSignature {
                index,
                len: bytes.len(),
            });
        }
        Ok(Self {
            r: B256::from_slice(&bytes[0..32]),
            s: B256::from_slice(&bytes[32..64]),
            v: bytes[64],
        })
    }
}

/// Signatures in the grouped encoding accepted by `executeSignatures`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSignatures(Bytes);

impl PackedSignatures {
    /// At most 255 signatures fit the one-byte count
    pub fn pack(signatures: &[Signature]) -> RelayResult<Self> {
        let count = u8::try_from(signatures.len()).map_err(|_| RelayError::TooManySignatures {
            count: signatures.len(),
        })?;

        let mut out = Vec::with_capacity(1 + signatures.len() * SIGNATURE_LEN);
        out.push(count);
        out.extend(signatures.iter().map(|sig| sig.v));
        for sig in signatures {
            out.extend_from_slice(sig.r.as_slice());
        }
        for sig in signatures {
            out.extend_from_slice(sig.s.as_slice());
        }
        Ok(Self(out.into()))
    }

    /// Inverse of [`PackedSignatures::pack`]
    pub fn unpack(bytes: &[u8]) -> Option<Vec<Signature>> {
        let (&count, rest) = bytes.split_first()?;
        let n = count as usize;
        if rest.len() != n * SIGNATURE_LEN {
            return None;
        }
        let (vs, rest) = rest.split_at(n);
        let (rs, ss) = rest.split_at(n * 32);
        Some(
            (0..n)
                .map(|i| Signature {
                    v: vs[i],
                    r: B256::from_slice(&rs[i * 32..(i + 1) * 32]),
                    s: B256::from_slice(&ss[i * 32..(i + 1) * 32]),
                })
                .collect(),
        )
    }

    pub fn count(&self) -> usize {
        self.0.first().copied().unwrap_or_default() as usize
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// Collects `requiredSignatures` validator signatures from the Home AMB
pub struct ThresholdSignatureAggregator {
    chain: Arc<dyn ChainHandle>,
    amb: Address,
    policy: PollPolicy,
    required: OnceCell<usize>,
}

impl ThresholdSignatureAggregator {
    pub fn new(chain: Arc<dyn ChainHandle>, amb: Address) -> Self {
        Self {
            chain,
            amb,
            policy: PollPolicy::default(),
            required: OnceCell::new(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `requiredSignatures`, read once per aggregator
    pub async fn required_signatures(&self) -> RelayResult<usize> {
        let required = self
            .required
            .get_or_try_init(|| async {
                let ret = call_contract(
                    self.chain.as_ref(),
                    self.amb,
                    IHomeAmb::requiredSignaturesCall {},
                )
                .await?;
                let n = usize::try_from(ret._0).map_err(|_| {
                    eyre::eyre!("requiredSignatures {} does not fit in usize", ret._0)
                })?;
                debug!(amb = %self.amb, required = n, "Read required signatures");
                Ok::<_, eyre::Report>(n)
            })
            .await?;
        Ok(*required)
    }

    /// Wait for `CollectedSignatures(messageHash)` from `start_block` onward
    pub async fn wait_for_collection(
        &self,
        message_hash: MessageHash,
        start_block: u64,
    ) -> RelayResult<()> {
        info!(
            message_hash = %message_hash,
            from_block = start_block,
            "Waiting for signatures to be collected"
        );

        // messageHash is not indexed, so matching happens on decoded logs
        let query = LogQuery::new(
            self.amb,
            IHomeAmb::CollectedSignatures::SIGNATURE_HASH,
            start_block,
        );

        let outcome = Poller::new(self.policy)
            .run("CollectedSignatures", |_| {
                let query = &query;
                async move {
                    let logs = self.chain.logs(query).await?;
                    let found = logs
                        .iter()
                        .any(|log| decode_collected_signatures(log) == Some(message_hash));
                    Ok::<_, RelayError>(found.then_some(()))
                }
            })
            .await?;

        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            PollOutcome::Exhausted { attempts } => Err(RelayError::SignatureCollectionTimeout {
                message_hash,
                attempts,
            }),
        }
    }

    /// Fetch every required signature for `message_hash` by index
    pub async fn fetch(&self, message_hash: MessageHash) -> RelayResult<Vec<Signature>> {
        let required = self.required_signatures().await?;
        let mut signatures = Vec::with_capacity(required);
        for index in 0..required {
            let ret = call_contract(
                self.chain.as_ref(),
                self.amb,
                IHomeAmb::signatureCall {
                    messageHash: message_hash.as_b256(),
                    index: U256::from(index),
                },
            )
            .await?;
            signatures.push(Signature::from_bytes(index, &ret._0)?);
        }
        Ok(signatures)
    }

    /// Full collection for an `encodedData` payload emitted at `start_block`
    pub async fn collect(
        &self,
        encoded_data: &[u8],
        start_block: u64,
    ) -> RelayResult<PackedSignatures> {
        let required = self.required_signatures().await?;
        let message_hash = MessageHash::of_encoded_data(encoded_data);
        self.wait_for_collection(message_hash, start_block).await?;
        let signatures = self.fetch(message_hash).await?;
        info!(
            message_hash = %message_hash,
            count = required,
            "Collected validator signatures"
        );
        PackedSignatures::pack(&signatures)
    }
}
