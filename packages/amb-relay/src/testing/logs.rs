//! Builders for bridge and token event logs

use alloy::primitives::{Address, Bytes, Log, LogData, B256, U256};
use alloy::sol_types::SolEvent;

use crate::evm::contracts::{IERC1155Bridgeable, IERC721Bridgeable, IForeignAmb, IHomeAmb, INftMediator};
use crate::types::{ChainLog, MessageHash, MessageId};

/// Wrap encoded event data as a log at block 1
pub fn wrap(address: Address, data: LogData) -> ChainLog {
    ChainLog {
        inner: Log { address, data },
        tx_hash: B256::ZERO,
        block_number: 1,
        log_index: 0,
    }
}

fn event_log<E: SolEvent>(address: Address, event: &E) -> ChainLog {
    wrap(address, event.encode_log_data())
}

pub fn signature_request(amb: Address, id: MessageId, encoded_data: Bytes) -> ChainLog {
    event_log(
        amb,
        &IHomeAmb::UserRequestForSignature {
            messageId: id.as_b256(),
            encodedData: encoded_data,
        },
    )
}

pub fn affirmation_request(amb: Address, id: MessageId, encoded_data: Bytes) -> ChainLog {
    event_log(
        amb,
        &IForeignAmb::UserRequestForAffirmation {
            messageId: id.as_b256(),
            encodedData: encoded_data,
        },
    )
}

pub fn relayed_message(amb: Address, id: MessageId, status: bool) -> ChainLog {
    event_log(
        amb,
        &IForeignAmb::RelayedMessage {
            sender: Address::ZERO,
            executor: Address::ZERO,
            messageId: id.as_b256(),
            status,
        },
    )
}

pub fn affirmation_completed(amb: Address, id: MessageId, status: bool) -> ChainLog {
    event_log(
        amb,
        &IHomeAmb::AffirmationCompleted {
            sender: Address::ZERO,
            executor: Address::ZERO,
            messageId: id.as_b256(),
            status,
        },
    )
}

pub fn information_request(
    amb: Address,
    id: MessageId,
    request_selector: B256,
    sender: Address,
    data: Bytes,
) -> ChainLog {
    event_log(
        amb,
        &IHomeAmb::UserRequestForInformation {
            messageId: id.as_b256(),
            requestSelector: request_selector,
            sender,
            data,
        },
    )
}

pub fn information_retrieved(amb: Address, id: MessageId, status: bool, callback_status: bool) -> ChainLog {
    event_log(
        amb,
        &IHomeAmb::InformationRetrieved {
            messageId: id.as_b256(),
            status,
            callbackStatus: callback_status,
        },
    )
}

pub fn collected_signatures(amb: Address, hash: MessageHash, count: u64) -> ChainLog {
    event_log(
        amb,
        &IHomeAmb::CollectedSignatures {
            authorityResponsibleForRelay: Address::ZERO,
            messageHash: hash.as_b256(),
            NumberOfCollectedSignatures: U256::from(count),
        },
    )
}

pub fn bridging_initiated(
    mediator: Address,
    token: Address,
    sender: Address,
    token_ids: Vec<U256>,
    id: MessageId,
) -> ChainLog {
    event_log(
        mediator,
        &INftMediator::TokensBridgingInitiated {
            token,
            sender,
            tokenIds: token_ids,
            values: Vec::new(),
            messageId: id.as_b256(),
        },
    )
}

pub fn tokens_bridged(
    mediator: Address,
    token: Address,
    recipient: Address,
    token_ids: Vec<U256>,
    id: MessageId,
) -> ChainLog {
    event_log(
        mediator,
        &INftMediator::TokensBridged {
            token,
            recipient,
            tokenIds: token_ids,
            values: Vec::new(),
            messageId: id.as_b256(),
        },
    )
}

pub fn failed_message_fixed(
    mediator: Address,
    id: MessageId,
    token: Address,
    recipient: Address,
    token_ids: Vec<U256>,
) -> ChainLog {
    event_log(
        mediator,
        &INftMediator::FailedMessageFixed {
            messageId: id.as_b256(),
            token,
            recipient,
            tokenIds: token_ids,
            values: Vec::new(),
        },
    )
}

pub fn erc721_transfer(token: Address, from: Address, to: Address, token_id: U256) -> ChainLog {
    event_log(
        token,
        &IERC721Bridgeable::Transfer {
            from,
            to,
            tokenId: token_id,
        },
    )
}

pub fn erc1155_transfer_single(
    token: Address,
    from: Address,
    to: Address,
    id: U256,
    value: U256,
) -> ChainLog {
    event_log(
        token,
        &IERC1155Bridgeable::TransferSingle {
            operator: Address::ZERO,
            from,
            to,
            id,
            value,
        },
    )
}

pub fn erc1155_transfer_batch(
    token: Address,
    from: Address,
    to: Address,
    ids: Vec<U256>,
    values: Vec<U256>,
) -> ChainLog {
    event_log(
        token,
        &IERC1155Bridgeable::TransferBatch {
            operator: Address::ZERO,
            from,
            to,
            ids,
            values,
        },
    )
}
