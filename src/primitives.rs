//! Consensus wire types. Serialization follows the canonical chain format:
//! little-endian integers, Bitcoin-style var-ints, double-SHA256 identifiers.

use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::util::sha256d;

pub trait Encodable {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError>;
}

pub trait Decodable: Sized {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError>;
}

pub fn write_var_int<W: Write + WriteBytesExt>(w: &mut W, n: u64) -> Result<usize, IoError> {
    if n < 0xfd {
        w.write_u8(n as u8)?;
        Ok(1)
    } else if n <= 0xffff {
        w.write_u8(0xfd)?;
        w.write_u16::<LittleEndian>(n as u16)?;
        Ok(3)
    } else if n <= 0xffff_ffff {
        w.write_u8(0xfe)?;
        w.write_u32::<LittleEndian>(n as u32)?;
        Ok(5)
    } else {
        w.write_u8(0xff)?;
        w.write_u64::<LittleEndian>(n)?;
        Ok(9)
    }
}

pub fn read_var_int<R: Read + ReadBytesExt>(r: &mut R) -> Result<u64, IoError> {
    match r.read_u8()? {
        0xff => r.read_u64::<LittleEndian>(),
        0xfe => r.read_u32::<LittleEndian>().map(|x| x as u64),
        0xfd => r.read_u16::<LittleEndian>().map(|x| x as u64),
        n => Ok(n as u64),
    }
}

fn write_var_bytes<W: Write + WriteBytesExt>(w: &mut W, b: &[u8]) -> Result<usize, IoError> {
    let mut written = write_var_int(w, b.len() as u64)?;
    w.write_all(b)?;
    written += b.len();
    Ok(written)
}

fn read_var_bytes<R: Read + ReadBytesExt>(r: &mut R) -> Result<Vec<u8>, IoError> {
    let len = read_var_int(r)?;
    if len > 2 * 1024 * 1024 {
        return Err(IoError::new(IoErrorKind::InvalidData, "var bytes too long"));
    }
    let mut buf = vec![0; len as usize];
    if len > 0 {
        r.read_exact(&mut buf)?;
    }
    Ok(buf)
}

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub hash: [u8; 32],
    pub n: u32,
}

impl OutPoint {
    pub fn new(hash: [u8; 32], n: u32) -> Self {
        OutPoint { hash, n }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.n == u32::MAX
    }
}

impl Encodable for OutPoint {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        w.write_all(&self.hash)?;
        w.write_u32::<LittleEndian>(self.n)?;
        Ok(36)
    }
}

impl Decodable for OutPoint {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError> {
        let mut hash = [0u8; 32];
        r.read_exact(&mut hash)?;
        let n = r.read_u32::<LittleEndian>()?;
        Ok(OutPoint { hash, n })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl Encodable for TxIn {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        let mut written = self.prevout.consensus_encode(w)?;
        written += write_var_bytes(w, &self.script_sig)?;
        w.write_u32::<LittleEndian>(self.sequence)?;
        written += 4;
        Ok(written)
    }
}

impl Decodable for TxIn {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError> {
        let prevout = OutPoint::consensus_decode(r)?;
        let script_sig = read_var_bytes(r)?;
        let sequence = r.read_u32::<LittleEndian>()?;
        Ok(TxIn {
            prevout,
            script_sig,
            sequence,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    pub fn new(value: i64, script_pubkey: Vec<u8>) -> Self {
        TxOut {
            value,
            script_pubkey,
        }
    }

    /// The marker output at position 0 of a coinstake.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

impl Encodable for TxOut {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        w.write_i64::<LittleEndian>(self.value)?;
        let written = write_var_bytes(w, &self.script_pubkey)?;
        Ok(8 + written)
    }
}

impl Decodable for TxOut {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError> {
        let value = r.read_i64::<LittleEndian>()?;
        let script_pubkey = read_var_bytes(r)?;
        Ok(TxOut {
            value,
            script_pubkey,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// Coinstake: spends a real outpoint, and vout[0] is the empty marker.
    pub fn is_coinstake(&self) -> bool {
        !self.vin.is_empty()
            && !self.vin[0].prevout.is_null()
            && self.vout.len() >= 2
            && self.vout[0].is_empty()
    }

    pub fn value_out(&self) -> i64 {
        self.vout.iter().map(|o| o.value).sum()
    }

    pub fn txid(&self) -> [u8; 32] {
        let mut buf = Vec::new();
        self.consensus_encode(&mut buf)
            .expect("in-memory tx encode cannot fail");
        sha256d(&buf)
    }
}

impl Encodable for Transaction {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        let mut written = 0;
        w.write_i32::<LittleEndian>(self.version)?;
        written += 4;
        written += write_var_int(w, self.vin.len() as u64)?;
        for txin in &self.vin {
            written += txin.consensus_encode(w)?;
        }
        written += write_var_int(w, self.vout.len() as u64)?;
        for txout in &self.vout {
            written += txout.consensus_encode(w)?;
        }
        w.write_u32::<LittleEndian>(self.lock_time)?;
        written += 4;
        Ok(written)
    }
}

impl Decodable for Transaction {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError> {
        let version = r.read_i32::<LittleEndian>()?;
        let vin_count = read_var_int(r)?;
        if vin_count > 100_000 {
            return Err(IoError::new(IoErrorKind::InvalidData, "tx vin count too large"));
        }
        let mut vin = Vec::with_capacity(vin_count as usize);
        for _ in 0..vin_count {
            vin.push(TxIn::consensus_decode(r)?);
        }
        let vout_count = read_var_int(r)?;
        if vout_count > 100_000 {
            return Err(IoError::new(IoErrorKind::InvalidData, "tx vout count too large"));
        }
        let mut vout = Vec::with_capacity(vout_count as usize);
        for _ in 0..vout_count {
            vout.push(TxOut::consensus_decode(r)?);
        }
        let lock_time = r.read_u32::<LittleEndian>()?;
        Ok(Transaction {
            version,
            vin,
            vout,
            lock_time,
        })
    }
}

/// 80-byte block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub const SIZE: usize = 80;

    pub fn block_hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.consensus_encode(&mut buf)
            .expect("in-memory header encode cannot fail");
        sha256d(&buf)
    }

    pub fn block_time(&self) -> i64 {
        self.timestamp as i64
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        w.write_i32::<LittleEndian>(self.version)?;
        w.write_all(&self.prev_block_hash)?;
        w.write_all(&self.merkle_root)?;
        w.write_u32::<LittleEndian>(self.timestamp)?;
        w.write_u32::<LittleEndian>(self.bits)?;
        w.write_u32::<LittleEndian>(self.nonce)?;
        Ok(Self::SIZE)
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError> {
        let version = r.read_i32::<LittleEndian>()?;
        let mut prev_block_hash = [0u8; 32];
        r.read_exact(&mut prev_block_hash)?;
        let mut merkle_root = [0u8; 32];
        r.read_exact(&mut merkle_root)?;
        let timestamp = r.read_u32::<LittleEndian>()?;
        let bits = r.read_u32::<LittleEndian>()?;
        let nonce = r.read_u32::<LittleEndian>()?;
        Ok(BlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Staker's signature over the block hash; present on PoS blocks.
    pub block_sig: Option<Vec<u8>>,
}

impl Block {
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }

    pub fn block_hash(&self) -> [u8; 32] {
        self.header.block_hash()
    }
}

impl Encodable for Block {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        let mut written = self.header.consensus_encode(w)?;
        written += write_var_int(w, self.transactions.len() as u64)?;
        for tx in &self.transactions {
            written += tx.consensus_encode(w)?;
        }
        if self.is_proof_of_stake() {
            match &self.block_sig {
                Some(sig) => written += write_var_bytes(w, sig)?,
                None => written += write_var_int(w, 0)?,
            }
        }
        Ok(written)
    }
}

impl Decodable for Block {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError> {
        let header = BlockHeader::consensus_decode(r)?;
        let tx_count = read_var_int(r)?;
        if tx_count == 0 || tx_count > 20_000 {
            return Err(IoError::new(IoErrorKind::InvalidData, "block tx count out of bounds"));
        }
        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            transactions.push(Transaction::consensus_decode(r)?);
        }
        let mut block_sig = None;
        if transactions.len() > 1 && transactions[1].is_coinstake() {
            let sig = read_var_bytes(r)?;
            if !sig.is_empty() {
                block_sig = Some(sig);
            }
        }
        Ok(Block {
            header,
            transactions,
            block_sig,
        })
    }
}
