//! This mod contains write and read functionality of impl `AccountLedgerState`

use std::io::{self, Error, ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use stx_status::tx_status::TxStatus;
use stx_sync::ledger::MempoolTx;

use super::{AccountLedgerState, LoadState};
use crate::utils::{read_string, write_string};

impl AccountLedgerState {
    /// Changes in version 2:
    /// - pending transactions store their sender and nonce
    #[must_use]
    pub const fn serialized_version() -> u64 {
        2
    }

    /// Serialize into `writer`. The load state and the last error are not persisted.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(Self::serialized_version())?;
        write_string(&mut writer, &self.principal)?;
        write_optional(&mut writer, self.confirmed_balance, |w, balance| {
            w.write_u128::<LittleEndian>(balance)
        })?;
        write_optional(&mut writer, self.confirmed_nonce, |w, nonce| {
            w.write_u64::<LittleEndian>(nonce)
        })?;
        writer.write_u64::<LittleEndian>(self.local_nonce)?;
        write_optional(&mut writer, self.last_fetch_timestamp, |w, timestamp| {
            w.write_u64::<LittleEndian>(timestamp)
        })?;
        writer.write_u64::<LittleEndian>(self.pending_transactions.len() as u64)?;
        for transaction in &self.pending_transactions {
            write_string(&mut writer, &transaction.tx_id)?;
            write_string(&mut writer, &transaction.tx_type)?;
            writer.write_u64::<LittleEndian>(transaction.receipt_time)?;
            write_string(&mut writer, &transaction.fee_rate)?;
            write_string(&mut writer, &transaction.sender_address)?;
            writer.write_u64::<LittleEndian>(transaction.nonce)?;
        }

        Ok(())
    }

    /// Deserialize from `reader`. Accounts with a confirmed nonce are restored as [`LoadState::Ready`].
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let version = reader.read_u64::<LittleEndian>()?;
        if version > Self::serialized_version() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "account state version {version} is newer than the supported version {}",
                    Self::serialized_version()
                ),
            ));
        }

        let principal = read_string(&mut reader)?;
        let confirmed_balance = read_optional(&mut reader, |r| r.read_u128::<LittleEndian>())?;
        let confirmed_nonce = read_optional(&mut reader, |r| r.read_u64::<LittleEndian>())?;
        let local_nonce = reader.read_u64::<LittleEndian>()?;
        let last_fetch_timestamp = read_optional(&mut reader, |r| r.read_u64::<LittleEndian>())?;

        let pending_count = reader.read_u64::<LittleEndian>()?;
        let mut pending_transactions = Vec::new();
        for _ in 0..pending_count {
            let tx_id = read_string(&mut reader)?;
            let tx_type = read_string(&mut reader)?;
            let receipt_time = reader.read_u64::<LittleEndian>()?;
            let fee_rate = read_string(&mut reader)?;
            let (sender_address, nonce) = match version {
                1 => (String::new(), 0),
                _ => (
                    read_string(&mut reader)?,
                    reader.read_u64::<LittleEndian>()?,
                ),
            };
            pending_transactions.push(MempoolTx {
                tx_id,
                tx_type,
                tx_status: TxStatus::Pending,
                receipt_time,
                sender_address,
                nonce,
                fee_rate,
            });
        }

        Ok(Self {
            principal,
            load_state: if confirmed_nonce.is_some() {
                LoadState::Ready
            } else {
                LoadState::Uninitialized
            },
            confirmed_balance,
            confirmed_nonce,
            local_nonce: confirmed_nonce.map_or(local_nonce, |nonce| local_nonce.max(nonce)),
            last_fetch_timestamp,
            last_error: None,
            pending_transactions,
        })
    }
}

fn write_optional<W, T, F>(mut writer: W, value: Option<T>, write: F) -> io::Result<()>
where
    W: Write,
    F: FnOnce(&mut W, T) -> io::Result<()>,
{
    match value {
        Some(value) => {
            writer.write_u8(1)?;
            write(&mut writer, value)
        }
        None => writer.write_u8(0),
    }
}

fn read_optional<R, T, F>(mut reader: R, read: F) -> io::Result<Option<T>>
where
    R: Read,
    F: FnOnce(&mut R) -> io::Result<T>,
{
    match reader.read_u8()? {
        0 => Ok(None),
        1 => read(&mut reader).map(Some),
        flag => Err(Error::new(
            ErrorKind::InvalidData,
            format!("invalid optional flag {flag}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountSnapshot;

    #[test]
    fn restores_nonces_and_pending_transactions() {
        let mut account = AccountLedgerState::new("ST2SENDER");
        account.apply_account(
            AccountSnapshot {
                balance: 1_000,
                nonce: 5,
            },
            1_700_000_000_000,
        );
        account.increment_local_nonce(7);
        account.add_pending_transaction(MempoolTx {
            tx_id: "0xabc".to_string(),
            tx_type: "contract_call".to_string(),
            tx_status: TxStatus::Pending,
            receipt_time: 1_700_000_000,
            sender_address: "ST2SENDER".to_string(),
            nonce: 6,
            fee_rate: "180".to_string(),
        });

        let mut buffer = Vec::new();
        account.write(&mut buffer).unwrap();
        let restored = AccountLedgerState::read(buffer.as_slice()).unwrap();

        assert_eq!(restored, account);
        assert_eq!(restored.local_nonce(), 7);
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut buffer = Vec::new();
        buffer
            .write_u64::<LittleEndian>(AccountLedgerState::serialized_version() + 1)
            .unwrap();
        let error = AccountLedgerState::read(buffer.as_slice()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn unfetched_account_restores_uninitialized() {
        let mut buffer = Vec::new();
        AccountLedgerState::new("ST2SENDER").write(&mut buffer).unwrap();
        let restored = AccountLedgerState::read(buffer.as_slice()).unwrap();
        assert_eq!(restored.load_state(), LoadState::Uninitialized);
        assert_eq!(restored.confirmed_nonce(), None);
    }
}
