use thiserror::Error;

/// Chain index lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainIndexError {
    #[error("null prev index")]
    NullPrev,
    #[error("block {0} not indexed")]
    NotIndexed(String),
    #[error("reached best block {hash} at height {height} from block {from}")]
    BeyondTip {
        hash: String,
        height: u32,
        from: String,
    },
}

/// Stake modifier computation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModifierError {
    #[error("unable to select block at round {0}")]
    Indeterminate(usize),
    /// The resolver could not reach far enough past the stake's block yet.
    /// Soft at the resolver level; becomes an error only when a proof has to
    /// be produced anyway.
    #[error("stake modifier not yet available for block {0}")]
    NotReadyYet(String),
}

/// Kernel hash verification failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("nTime violation: tx time {time_tx} precedes block-from time {time_block_from}")]
    TimeViolation { time_tx: u32, time_block_from: u32 },
    #[error("min age violation: tx time {time_tx}, block-from time {time_block_from}")]
    MinAgeViolation { time_tx: u32, time_block_from: u32 },
    #[error("min amount violation: staked value {value}")]
    MinValueViolation { value: i64 },
    #[error("proof-of-stake hash {hash} does not meet target")]
    TargetExceeded { hash: String },
    #[error("kernel script mismatch on coinstake {txid}")]
    ScriptMismatch { txid: String },
    #[error("called on non-coinstake {txid}")]
    NotCoinStake { txid: String },
}

/// Payee enforcement failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayeeError {
    #[error("missing expected masternode payee in block at height {height}")]
    MissingMasternodePayee { height: u32 },
    #[error("wrong generation recipient at height {height}")]
    WrongGenerationRecipient { height: u32 },
}

/// Block-body I/O failures while loading the staked coin's parent tx.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("tx index not found for {0}")]
    TxIndexMissing(String),
    #[error("deserialize or I/O error reading block data: {0}")]
    DeserializeFailed(#[from] std::io::Error),
    #[error("txid mismatch: read {read}, expected {expected}")]
    TxidMismatch { read: String, expected: String },
    #[error("block store error: {0}")]
    Store(#[from] crate::storage::StoreError),
}

/// Top-level error surfaced by the consensus entry points. Nothing is
/// retried; the caller rejects the block or transaction and logs.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error(transparent)]
    ChainIndex(#[from] ChainIndexError),
    #[error(transparent)]
    Modifier(#[from] ModifierError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Payee(#[from] PayeeError),
    #[error(transparent)]
    Io(#[from] IoError),
}
