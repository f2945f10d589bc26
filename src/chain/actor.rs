use crate::chain::ledger::{Ledger, LedgerStats};
use crate::consensus::execution::MutationDescriptor;
use crate::consensus::validation::{TxValidator, Verified};
use crate::core::components::{Address, AssetId, TxId};
use crate::core::transaction::SignedTx;
use crate::{LedgerError, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 100;

#[derive(Debug)]
pub enum ChainCommand {
    Submit {
        tx: Verified<SignedTx>,
        reply: oneshot::Sender<Result<MutationDescriptor>>,
    },
    Accept {
        tx_id: TxId,
        reply: oneshot::Sender<Result<()>>,
    },
    Reject {
        tx_id: TxId,
        reply: oneshot::Sender<bool>,
    },
    Process {
        tx: Verified<SignedTx>,
        reply: oneshot::Sender<Result<TxId>>,
    },
    GetBalance {
        address: Address,
        asset: AssetId,
        reply: oneshot::Sender<Result<u64>>,
    },
    GetStats {
        reply: oneshot::Sender<LedgerStats>,
    },
}

/// Owns one chain's ledger and serializes every stateful request to it.
pub struct ChainActor {
    ledger: Ledger,
    command_receiver: mpsc::Receiver<ChainCommand>,
}

impl ChainActor {
    pub fn new(ledger: Ledger) -> (Self, ChainHandle) {
        let (command_sender, command_receiver) = mpsc::channel(COMMAND_BUFFER);
        let handle = ChainHandle {
            validator: ledger.validator().clone(),
            command_sender,
        };

        (Self { ledger, command_receiver }, handle)
    }

    /// Starts the actor on the current tokio runtime.
    pub fn spawn(ledger: Ledger) -> (ChainHandle, JoinHandle<()>) {
        let (actor, handle) = Self::new(ledger);
        (handle, tokio::spawn(actor.run()))
    }

    pub async fn run(mut self) {
        log::info!("🚀 Chain actor started for {}", self.ledger.chain_id());

        while let Some(command) = self.command_receiver.recv().await {
            if let Err(e) = self.handle_command(command) {
                log::error!("💥 Chain {} halted: {}", self.ledger.chain_id(), e);
                break;
            }
        }

        log::info!("🛑 Chain actor stopped for {}", self.ledger.chain_id());
    }

    /// Errors returned here are fatal and stop the actor. Transaction
    /// failures go back to the caller instead.
    fn handle_command(&mut self, command: ChainCommand) -> Result<()> {
        match command {
            ChainCommand::Submit { tx, reply } => {
                let _ = reply.send(self.ledger.submit(tx));
            }
            ChainCommand::Accept { tx_id, reply } => {
                let result = self.ledger.accept_pending(&tx_id);
                return Self::reply_checked(reply, result);
            }
            ChainCommand::Reject { tx_id, reply } => {
                let _ = reply.send(self.ledger.reject(&tx_id));
            }
            ChainCommand::Process { tx, reply } => {
                let tx_id = tx.id();
                let result = self
                    .ledger
                    .submit(tx)
                    .and_then(|_| self.ledger.accept_pending(&tx_id))
                    .map(|_| tx_id);
                return Self::reply_checked(reply, result);
            }
            ChainCommand::GetBalance { address, asset, reply } => {
                let _ = reply.send(self.ledger.get_balance(&address, &asset));
            }
            ChainCommand::GetStats { reply } => {
                let _ = reply.send(self.ledger.stats().clone());
            }
        }
        Ok(())
    }

    fn reply_checked<T>(reply: oneshot::Sender<Result<T>>, result: Result<T>) -> Result<()> {
        let fatal = match &result {
            Err(e) if e.is_fatal() => Some(e.to_string()),
            _ => None,
        };
        let _ = reply.send(result);

        match fatal {
            Some(message) => Err(LedgerError::Storage(message)),
            None => Ok(()),
        }
    }
}

/// Cloneable client of a chain actor. Syntactic verification runs on the
/// caller's task; only stateful work is sent to the actor.
#[derive(Debug, Clone)]
pub struct ChainHandle {
    validator: TxValidator,
    command_sender: mpsc::Sender<ChainCommand>,
}

impl ChainHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ChainCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.command_sender
            .send(command(reply))
            .await
            .map_err(|_| LedgerError::ChainStopped)?;
        response.await.map_err(|_| LedgerError::ChainStopped)
    }

    pub async fn submit(&self, tx: SignedTx) -> Result<MutationDescriptor> {
        let tx = self.validator.verify(tx)?;
        self.request(|reply| ChainCommand::Submit { tx, reply }).await?
    }

    pub async fn accept(&self, tx_id: TxId) -> Result<()> {
        self.request(|reply| ChainCommand::Accept { tx_id, reply }).await?
    }

    pub async fn reject(&self, tx_id: TxId) -> Result<bool> {
        self.request(|reply| ChainCommand::Reject { tx_id, reply }).await
    }

    pub async fn process(&self, tx: SignedTx) -> Result<TxId> {
        let tx = self.validator.verify(tx)?;
        self.request(|reply| ChainCommand::Process { tx, reply }).await?
    }

    pub async fn get_balance(&self, address: Address, asset: AssetId) -> Result<u64> {
        self.request(|reply| ChainCommand::GetBalance { address, asset, reply }).await?
    }

    pub async fn get_stats(&self) -> Result<LedgerStats> {
        self.request(|reply| ChainCommand::GetStats { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::config::Config;
    use crate::core::components::{TransferableInput, TransferableOutput, Utxo, UtxoId};
    use crate::core::transaction::{BaseTx, UnsignedTx};
    use crate::core::utxo::AssetDefinition;
    use crate::crypto::hash::{Hash160, Hash256};
    use crate::crypto::keys::PrivateKey;
    use crate::fx::secp256k1::{Input, OutputOwners, TransferInput, TransferOutput};
    use crate::fx::{FxId, FxRegistry, Output};
    use crate::storage::Database;

    fn setup(owner: Hash160) -> Result<(Ledger, Utxo)> {
        let params = Config::local().chain;
        let ledger = Ledger::new(params.clone(), Database::temporary()?, Codec::default(), FxRegistry::default());
        ledger.seed_asset(
            params.fee_asset,
            AssetDefinition {
                name: "Fee".to_string(),
                symbol: "FEE".to_string(),
                denomination: 9,
                fxs: vec![FxId::Secp256k1],
            },
        )?;

        let utxo = Utxo {
            utxo_id: UtxoId::new(Hash256::hash(b"genesis"), 0),
            asset: params.fee_asset,
            out: Output::Transfer(TransferOutput { amount: 1_000, owners: OutputOwners::single(owner) }),
        };
        ledger.seed_utxo(utxo.clone())?;
        Ok((ledger, utxo))
    }

    fn transfer(ledger: &Ledger, utxo: &Utxo, to: Hash160, key: &PrivateKey) -> Result<SignedTx> {
        let params = ledger.params();
        let unsigned = UnsignedTx::Base(BaseTx {
            ins: vec![TransferableInput {
                utxo_id: utxo.utxo_id,
                asset: utxo.asset,
                input: TransferInput { amount: 1_000, input: Input::new(vec![0]) },
            }],
            outs: vec![TransferableOutput {
                asset: params.fee_asset,
                out: TransferOutput { amount: 990, owners: OutputOwners::single(to) },
            }],
            ..BaseTx::new(params.network_id, params.chain_id)
        });
        SignedTx::sign(ledger.codec(), unsigned, &[vec![key.clone()]])
    }

    #[tokio::test]
    async fn test_process_through_handle() -> Result<()> {
        let alice = PrivateKey::new()?;
        let bob = Hash160::new([2u8; 20]);
        let (ledger, genesis) = setup(alice.address())?;
        let fee_asset = ledger.params().fee_asset;
        let tx = transfer(&ledger, &genesis, bob, &alice)?;

        let (handle, task) = ChainActor::spawn(ledger);
        handle.process(tx.clone()).await?;

        assert_eq!(handle.get_balance(bob, fee_asset).await?, 990);
        assert_eq!(handle.get_stats().await?.accepted, 1);

        // The same transaction again: its input is gone.
        assert!(matches!(handle.process(tx).await, Err(LedgerError::MissingUtxo { .. })));

        drop(handle);
        task.await.unwrap();
        Ok(())
    }

    #[tokio::test]
    async fn test_syntactic_failure_never_reaches_actor() -> Result<()> {
        let alice = PrivateKey::new()?;
        let (ledger, genesis) = setup(alice.address())?;
        let tx = transfer(&ledger, &genesis, Hash160::new([2u8; 20]), &alice)?;
        let unsigned = tx.unsigned().clone();
        let unsigned_tx = SignedTx::new(ledger.codec(), unsigned, vec![])?;

        let (handle, _task) = ChainActor::spawn(ledger);
        let result = handle.submit(unsigned_tx).await;
        assert!(matches!(result, Err(LedgerError::WrongNumberOfCredentials { .. })));
        assert_eq!(handle.get_stats().await?.accepted, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_submit_then_reject() -> Result<()> {
        let alice = PrivateKey::new()?;
        let (ledger, genesis) = setup(alice.address())?;
        let tx = transfer(&ledger, &genesis, Hash160::new([2u8; 20]), &alice)?;

        let (handle, _task) = ChainActor::spawn(ledger);
        let descriptor = handle.submit(tx).await?;
        assert!(handle.reject(descriptor.tx_id).await?);

        let accept = handle.accept(descriptor.tx_id).await;
        assert!(matches!(accept, Err(LedgerError::InvalidTx(_))));
        Ok(())
    }
}
