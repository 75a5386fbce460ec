use std::io::Cursor;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::primitives::{Block, Decodable, Encodable, Transaction};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("codec error: {0}")]
    Codec(#[from] std::io::Error),
}

/// Location of a transaction inside its block: the block's hash plus the
/// byte offset from the start of the serialized block to the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskTxPos {
    pub block_hash: [u8; 32],
    pub tx_offset: u32,
}

/// Block-body and tx-index store. The kernel reads through this to load the
/// header and parent transaction of a staked coin; the node writes to it as
/// blocks connect.
pub trait BlockStore: Send + Sync + std::fmt::Debug {
    fn save_block(&self, block: &Block) -> Result<(), StoreError>;
    fn get_block(&self, hash: &[u8; 32]) -> Result<Option<Block>, StoreError>;
    fn read_tx_index(&self, txid: &[u8; 32]) -> Result<Option<DiskTxPos>, StoreError>;
    /// Raw serialized bytes of the block holding the given position.
    fn open_block_file(&self, pos: &DiskTxPos) -> Result<Vec<u8>, StoreError>;
    fn get_tx(&self, txid: &[u8; 32]) -> Result<Option<Transaction>, StoreError>;
}

/// Serialize a block and record the byte offset of each transaction.
fn encode_block_with_tx_offsets(block: &Block) -> Result<(Vec<u8>, Vec<([u8; 32], u32)>), StoreError> {
    let mut buf = Vec::new();
    block.header.consensus_encode(&mut buf)?;
    crate::primitives::write_var_int(&mut buf, block.transactions.len() as u64)?;
    let mut offsets = Vec::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        offsets.push((tx.txid(), buf.len() as u32));
        tx.consensus_encode(&mut buf)?;
    }
    if block.is_proof_of_stake() {
        match &block.block_sig {
            Some(sig) => {
                crate::primitives::write_var_int(&mut buf, sig.len() as u64)?;
                buf.extend_from_slice(sig);
            }
            None => {
                crate::primitives::write_var_int(&mut buf, 0)?;
            }
        }
    }
    Ok((buf, offsets))
}

pub struct SqliteBlockStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBlockStore")
            .field("conn", &"Mutex<Connection>")
            .finish()
    }
}

impl SqliteBlockStore {
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (hash BLOB PRIMARY KEY, block_data BLOB NOT NULL)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tx_index (txid BLOB PRIMARY KEY, block_hash BLOB NOT NULL, tx_offset INTEGER NOT NULL)",
            [],
        )?;
        Ok(SqliteBlockStore {
            conn: Mutex::new(conn),
        })
    }
}

impl BlockStore for SqliteBlockStore {
    fn save_block(&self, block: &Block) -> Result<(), StoreError> {
        let block_hash = block.block_hash();
        let (block_data, offsets) = encode_block_with_tx_offsets(block)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO blocks (hash, block_data) VALUES (?1, ?2)",
            params![block_hash.to_vec(), block_data],
        )?;
        for (txid, tx_offset) in offsets {
            conn.execute(
                "INSERT OR REPLACE INTO tx_index (txid, block_hash, tx_offset) VALUES (?1, ?2, ?3)",
                params![txid.to_vec(), block_hash.to_vec(), tx_offset],
            )?;
        }
        log::debug!("saved block {} to store", hex::encode(block_hash));
        Ok(())
    }

    fn get_block(&self, hash: &[u8; 32]) -> Result<Option<Block>, StoreError> {
        let pos = DiskTxPos {
            block_hash: *hash,
            tx_offset: 0,
        };
        let raw = match self.open_block_file(&pos) {
            Ok(raw) => raw,
            Err(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let block = Block::consensus_decode(&mut Cursor::new(raw))?;
        Ok(Some(block))
    }

    fn read_tx_index(&self, txid: &[u8; 32]) -> Result<Option<DiskTxPos>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT block_hash, tx_offset FROM tx_index WHERE txid = ?1")?;
        let mut rows = stmt.query(params![txid.to_vec()])?;
        if let Some(row) = rows.next()? {
            let hash_vec: Vec<u8> = row.get(0)?;
            let tx_offset: u32 = row.get(1)?;
            if hash_vec.len() != 32 {
                return Err(StoreError::Codec(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "invalid block hash length in tx index",
                )));
            }
            let mut block_hash = [0u8; 32];
            block_hash.copy_from_slice(&hash_vec);
            Ok(Some(DiskTxPos {
                block_hash,
                tx_offset,
            }))
        } else {
            Ok(None)
        }
    }

    fn open_block_file(&self, pos: &DiskTxPos) -> Result<Vec<u8>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let data: Vec<u8> = conn.query_row(
            "SELECT block_data FROM blocks WHERE hash = ?1",
            params![pos.block_hash.to_vec()],
            |row| row.get(0),
        )?;
        Ok(data)
    }

    fn get_tx(&self, txid: &[u8; 32]) -> Result<Option<Transaction>, StoreError> {
        let pos = match self.read_tx_index(txid)? {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let raw = self.open_block_file(&pos)?;
        let mut cursor = Cursor::new(raw);
        cursor.set_position(pos.tx_offset as u64);
        let tx = Transaction::consensus_decode(&mut cursor)?;
        Ok(Some(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{BlockHeader, OutPoint, TxIn, TxOut};

    fn sample_block() -> Block {
        let coinbase = Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::new([0; 32], u32::MAX),
                script_sig: vec![0x04, 0x01],
                sequence: u32::MAX,
            }],
            vout: vec![TxOut::new(50 * crate::chainparams::COIN, vec![0x76, 0xa9])],
            lock_time: 0,
        };
        let spend = Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::new(coinbase.txid(), 0),
                script_sig: vec![0x51],
                sequence: u32::MAX,
            }],
            vout: vec![TxOut::new(49 * crate::chainparams::COIN, vec![0xaa, 0xbb])],
            lock_time: 0,
        };
        Block {
            header: BlockHeader {
                version: 5,
                prev_block_hash: [1; 32],
                merkle_root: [2; 32],
                timestamp: 1_600_000_000,
                bits: 0x1e0ffff0,
                nonce: 11,
            },
            transactions: vec![coinbase, spend],
            block_sig: None,
        }
    }

    fn exercise_store(store: &dyn BlockStore) {
        let block = sample_block();
        store.save_block(&block).unwrap();

        let loaded = store.get_block(&block.block_hash()).unwrap().unwrap();
        assert_eq!(loaded, block);

        for tx in &block.transactions {
            let pos = store.read_tx_index(&tx.txid()).unwrap().unwrap();
            assert_eq!(pos.block_hash, block.block_hash());
            // Decoding at the recorded offset yields the same transaction.
            let raw = store.open_block_file(&pos).unwrap();
            let mut cursor = Cursor::new(raw);
            cursor.set_position(pos.tx_offset as u64);
            let decoded = Transaction::consensus_decode(&mut cursor).unwrap();
            assert_eq!(&decoded, tx);
            assert_eq!(store.get_tx(&tx.txid()).unwrap().unwrap(), *tx);
        }

        assert!(store.get_block(&[9u8; 32]).unwrap().is_none());
        assert!(store.read_tx_index(&[9u8; 32]).unwrap().is_none());
        assert!(store.get_tx(&[9u8; 32]).unwrap().is_none());
    }

    #[test]
    fn sqlite_store_round_trip() {
        let store = SqliteBlockStore::open_in_memory().unwrap();
        exercise_store(&store);
    }

    #[test]
    fn tx_offsets_start_after_header_and_count() {
        let block = sample_block();
        let (raw, offsets) = encode_block_with_tx_offsets(&block).unwrap();
        // Two transactions fit in a single-byte var-int.
        assert_eq!(offsets[0].1 as usize, BlockHeader::SIZE + 1);
        assert!(offsets[1].1 > offsets[0].1);
        assert!((offsets[1].1 as usize) < raw.len());
    }
}
