//! Token metadata synchronization over two in-memory chains
//!
//! Pushes go Home -> Foreign as regular messages delivered through manual
//! relay. Pulls are information requests answered on Home; the simulated
//! validators answer only when the test asks them to.

use alloy::primitives::{address, Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolValue};
use amb_relay::evm::contracts::{
    IERC1155Bridgeable, IERC721Bridgeable, IForeignAmb, IHomeAmb, INftMediator,
};
use amb_relay::testing::{logs, FakeChain, SubmitResponse};
use amb_relay::{
    eth_call_request_selector, AmbBridge, ChainSide, CorrelationError, DeliveryRoute,
    DeliveryStatus, Mediator, MessageHash, MessageId, MetadataUpdate, NftToken, PackedSignatures,
    RelayError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

alloy::sol! {
    /// Foreign mediator entry points for pushed metadata
    interface IBridgedMetadata {
        function setBridgedOwner(address bridgedToken, address newOwner) external;
        function setBridgedTokenURI(address bridgedToken, uint256 tokenId, string memory uri) external;
    }
}

const USER: Address = address!("00000000000000000000000000000000000000a1");
const OTHER_USER: Address = address!("00000000000000000000000000000000000000a2");
const OWNER: Address = address!("000000000000000000000000000000000000000e");
const HOME_AMB: Address = address!("0000000000000000000000000000000000001a4b");
const FOREIGN_AMB: Address = address!("0000000000000000000000000000000000002a4b");
const HOME_MEDIATOR: Address = address!("0000000000000000000000000000000000001bed");
const FOREIGN_MEDIATOR: Address = address!("0000000000000000000000000000000000002bed");
const HOME_TOKEN: Address = address!("0000000000000000000000000000000000001070");
const FOREIGN_BRIDGED: Address = address!("0000000000000000000000000000000000002070");
const FOREIGN_MULTI_TOKEN: Address = address!("0000000000000000000000000000000000002071");
const HOME_MULTI_BRIDGED: Address = address!("0000000000000000000000000000000000001071");

const REQUIRED_SIGNATURES: u64 = 2;
const NEW_URI: &str = "https://example.com";

#[derive(Debug, Clone, Default)]
struct TokenMeta {
    owner: Address,
    uris: HashMap<U256, String>,
}

#[derive(Default)]
struct Ledger {
    next_message: u64,
    tokens: HashMap<Address, TokenMeta>,
    eth_call_enabled: bool,
    /// Information requests not answered yet
    pending: Vec<(B256, MetadataUpdate)>,
}

impl Ledger {
    fn next_message_id(&mut self) -> B256 {
        self.next_message += 1;
        B256::from(U256::from(0x1f0_0000 + self.next_message))
    }

    fn meta(&mut self, token: Address) -> &mut TokenMeta {
        self.tokens.entry(token).or_default()
    }
}

fn lock(ledger: &Arc<Mutex<Ledger>>) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap()
}

fn ret<T: SolValue>(value: T) -> Bytes {
    (value,).abi_encode_params().into()
}

fn raw_signature(seed: u8) -> Bytes {
    let mut bytes = vec![seed; 64];
    bytes.push(27);
    bytes.into()
}

/// Log pair emitted by the Home AMB for a message that needs validator signatures
fn signed_message(message_id: B256, payload: Vec<u8>) -> Vec<amb_relay::ChainLog> {
    let mut encoded = message_id.to_vec();
    encoded.extend(payload);
    let hash = MessageHash::of_encoded_data(&encoded);
    vec![
        logs::signature_request(HOME_AMB, MessageId(message_id), encoded.into()),
        logs::collected_signatures(HOME_AMB, hash, REQUIRED_SIGNATURES),
    ]
}

struct Fixture {
    home: Arc<FakeChain>,
    foreign: Arc<FakeChain>,
    ledger: Arc<Mutex<Ledger>>,
    bridge: AmbBridge,
}

impl Fixture {
    async fn new() -> Self {
        let home = Arc::new(FakeChain::new(ChainSide::Home).with_account(USER));
        let foreign = Arc::new(FakeChain::new(ChainSide::Foreign).with_account(USER));
        let ledger = Arc::new(Mutex::new(Ledger::default()));
        {
            let mut l = lock(&ledger);
            l.meta(HOME_TOKEN).owner = USER;
            l.meta(FOREIGN_MULTI_TOKEN).owner = USER;
            l.meta(FOREIGN_BRIDGED).owner = FOREIGN_MEDIATOR;
            l.meta(HOME_MULTI_BRIDGED).owner = HOME_MEDIATOR;
        }

        install_amb_views(&home, &foreign);
        install_erc721(&home, HOME_TOKEN, &ledger);
        install_erc721(&foreign, FOREIGN_BRIDGED, &ledger);
        install_erc1155(&foreign, FOREIGN_MULTI_TOKEN, &ledger);
        install_erc1155(&home, HOME_MULTI_BRIDGED, &ledger);
        install_push(&home, &ledger);
        install_pull(&home, &ledger);
        install_foreign_amb(&foreign, &ledger);

        let bridge = AmbBridge::connect(
            Mediator::new(home.clone(), HOME_MEDIATOR),
            Mediator::new(foreign.clone(), FOREIGN_MEDIATOR),
        )
        .await
        .unwrap();

        Self {
            home,
            foreign,
            ledger,
            bridge,
        }
    }

    /// Validators read the native token on Foreign and answer every pending request
    fn answer_information_requests(&self) {
        let mut l = lock(&self.ledger);
        let pending: Vec<_> = l.pending.drain(..).collect();
        for (message_id, update) in pending {
            let native = l.meta(FOREIGN_MULTI_TOKEN).clone();
            let status = match update {
                MetadataUpdate::Owner => {
                    l.meta(HOME_MULTI_BRIDGED).owner = native.owner;
                    true
                }
                MetadataUpdate::Erc1155Uri(id) => {
                    let uri = native.uris.get(&id).cloned().unwrap_or_default();
                    l.meta(HOME_MULTI_BRIDGED).uris.insert(id, uri);
                    true
                }
                // tokenURI is not part of the ERC-1155 token, the eth_call reverts
                MetadataUpdate::Erc721Uri(_) => false,
            };
            self.home.mine(
                HOME_AMB,
                SubmitResponse::success(vec![logs::information_retrieved(
                    HOME_AMB,
                    MessageId(message_id),
                    status,
                    true,
                )]),
            );
        }
    }
}

fn install_amb_views(home: &Arc<FakeChain>, foreign: &Arc<FakeChain>) {
    home.respond_value(HOME_MEDIATOR, INftMediator::bridgeContractCall::SELECTOR, HOME_AMB);
    foreign.respond_value(
        FOREIGN_MEDIATOR,
        INftMediator::bridgeContractCall::SELECTOR,
        FOREIGN_AMB,
    );
    home.respond_value(
        HOME_AMB,
        IHomeAmb::requiredSignaturesCall::SELECTOR,
        U256::from(REQUIRED_SIGNATURES),
    );
    home.respond_with(HOME_AMB, IHomeAmb::signatureCall::SELECTOR, |input| {
        let call = IHomeAmb::signatureCall::abi_decode(input, true)?;
        Ok(ret(raw_signature(call.index.to::<u8>() + 1)))
    });
}

fn install_erc721(chain: &Arc<FakeChain>, token: Address, ledger: &Arc<Mutex<Ledger>>) {
    let l = ledger.clone();
    chain.respond_with(token, IERC721Bridgeable::ownerCall::SELECTOR, move |_| {
        Ok(ret(lock(&l).meta(token).owner))
    });
    let l = ledger.clone();
    chain.respond_with(token, IERC721Bridgeable::tokenURICall::SELECTOR, move |input| {
        let call = IERC721Bridgeable::tokenURICall::abi_decode(input, true)?;
        let uri = lock(&l).meta(token).uris.get(&call.tokenId).cloned().unwrap_or_default();
        Ok(ret(uri))
    });
    let l = ledger.clone();
    chain.on_submit(token, IERC721Bridgeable::setOwnerCall::SELECTOR, move |sub| {
        let call = IERC721Bridgeable::setOwnerCall::abi_decode(&sub.input, true)?;
        let mut l = lock(&l);
        let meta = l.meta(token);
        if sub.from != Some(meta.owner) {
            return Ok(SubmitResponse::reverted());
        }
        meta.owner = call.newOwner;
        Ok(SubmitResponse::success(Vec::new()))
    });
    let l = ledger.clone();
    chain.on_submit(token, IERC721Bridgeable::setTokenURICall::SELECTOR, move |sub| {
        let call = IERC721Bridgeable::setTokenURICall::abi_decode(&sub.input, true)?;
        lock(&l).meta(token).uris.insert(call.tokenId, call.newTokenURI);
        Ok(SubmitResponse::success(Vec::new()))
    });
}

fn install_erc1155(chain: &Arc<FakeChain>, token: Address, ledger: &Arc<Mutex<Ledger>>) {
    let l = ledger.clone();
    chain.respond_with(token, IERC1155Bridgeable::ownerCall::SELECTOR, move |_| {
        Ok(ret(lock(&l).meta(token).owner))
    });
    let l = ledger.clone();
    chain.respond_with(token, IERC1155Bridgeable::uriCall::SELECTOR, move |input| {
        let call = IERC1155Bridgeable::uriCall::abi_decode(input, true)?;
        let uri = lock(&l).meta(token).uris.get(&call.id).cloned().unwrap_or_default();
        Ok(ret(uri))
    });
    let l = ledger.clone();
    chain.on_submit(token, IERC1155Bridgeable::setOwnerCall::SELECTOR, move |sub| {
        let call = IERC1155Bridgeable::setOwnerCall::abi_decode(&sub.input, true)?;
        let mut l = lock(&l);
        let meta = l.meta(token);
        if sub.from != Some(meta.owner) {
            return Ok(SubmitResponse::reverted());
        }
        meta.owner = call.newOwner;
        Ok(SubmitResponse::success(Vec::new()))
    });
    let l = ledger.clone();
    chain.on_submit(token, IERC1155Bridgeable::setTokenURICall::SELECTOR, move |sub| {
        let call = IERC1155Bridgeable::setTokenURICall::abi_decode(&sub.input, true)?;
        lock(&l).meta(token).uris.insert(call.id, call.newTokenURI);
        Ok(SubmitResponse::success(Vec::new()))
    });
}

/// Home mediator pushing metadata of its native ERC-721 token
fn install_push(home: &Arc<FakeChain>, ledger: &Arc<Mutex<Ledger>>) {
    let l = ledger.clone();
    home.on_submit(
        HOME_MEDIATOR,
        INftMediator::pushTokenOwnerUpdateCall::SELECTOR,
        move |sub| {
            let call = INftMediator::pushTokenOwnerUpdateCall::abi_decode(&sub.input, true)?;
            let mut l = lock(&l);
            if call.token != HOME_TOKEN {
                return Ok(SubmitResponse::reverted());
            }
            let payload = IBridgedMetadata::setBridgedOwnerCall {
                bridgedToken: FOREIGN_BRIDGED,
                newOwner: l.meta(HOME_TOKEN).owner,
            }
            .abi_encode();
            let message_id = l.next_message_id();
            Ok(SubmitResponse::success(signed_message(message_id, payload)))
        },
    );

    let l = ledger.clone();
    home.on_submit(
        HOME_MEDIATOR,
        INftMediator::pushERC721URIUpdateCall::SELECTOR,
        move |sub| {
            let call = INftMediator::pushERC721URIUpdateCall::abi_decode(&sub.input, true)?;
            let mut l = lock(&l);
            if call.token != HOME_TOKEN {
                return Ok(SubmitResponse::reverted());
            }
            let uri = l.meta(HOME_TOKEN).uris.get(&call.tokenId).cloned().unwrap_or_default();
            let payload = IBridgedMetadata::setBridgedTokenURICall {
                bridgedToken: FOREIGN_BRIDGED,
                tokenId: call.tokenId,
                uri,
            }
            .abi_encode();
            let message_id = l.next_message_id();
            Ok(SubmitResponse::success(signed_message(message_id, payload)))
        },
    );

    // The only native token is an ERC-721
    home.on_submit(
        HOME_MEDIATOR,
        INftMediator::pushERC1155URIUpdateCall::SELECTOR,
        |_| Ok(SubmitResponse::reverted()),
    );
}

type PullDecoder = fn(&[u8]) -> eyre::Result<(Address, MetadataUpdate)>;

fn decode_owner_pull(input: &[u8]) -> eyre::Result<(Address, MetadataUpdate)> {
    let call = INftMediator::pullTokenOwnerUpdateCall::abi_decode(input, true)?;
    Ok((call.bridgedToken, MetadataUpdate::Owner))
}

fn decode_erc721_uri_pull(input: &[u8]) -> eyre::Result<(Address, MetadataUpdate)> {
    let call = INftMediator::pullERC721URIUpdateCall::abi_decode(input, true)?;
    Ok((call.bridgedToken, MetadataUpdate::Erc721Uri(call.tokenId)))
}

fn decode_erc1155_uri_pull(input: &[u8]) -> eyre::Result<(Address, MetadataUpdate)> {
    let call = INftMediator::pullERC1155URIUpdateCall::abi_decode(input, true)?;
    Ok((call.bridgedToken, MetadataUpdate::Erc1155Uri(call.tokenId)))
}

/// Home mediator asking for metadata of the Foreign native ERC-1155 token
fn install_pull(home: &Arc<FakeChain>, ledger: &Arc<Mutex<Ledger>>) {
    let l = ledger.clone();
    home.on_submit(
        HOME_AMB,
        IHomeAmb::enableAsyncRequestSelectorCall::SELECTOR,
        move |sub| {
            let call = IHomeAmb::enableAsyncRequestSelectorCall::abi_decode(&sub.input, true)?;
            if sub.from != Some(OWNER) || call.requestSelector != eth_call_request_selector() {
                return Ok(SubmitResponse::reverted());
            }
            lock(&l).eth_call_enabled = call.enable;
            Ok(SubmitResponse::success(Vec::new()))
        },
    );

    let requests: [([u8; 4], PullDecoder); 3] = [
        (INftMediator::pullTokenOwnerUpdateCall::SELECTOR, decode_owner_pull),
        (INftMediator::pullERC721URIUpdateCall::SELECTOR, decode_erc721_uri_pull),
        (INftMediator::pullERC1155URIUpdateCall::SELECTOR, decode_erc1155_uri_pull),
    ];
    for (selector, decode) in requests {
        let l = ledger.clone();
        home.on_submit(HOME_MEDIATOR, selector, move |sub| {
            let (bridged, update) = decode(&sub.input)?;
            let mut l = lock(&l);
            if !l.eth_call_enabled || bridged != HOME_MULTI_BRIDGED {
                return Ok(SubmitResponse::reverted());
            }
            let message_id = l.next_message_id();
            l.pending.push((message_id, update));
            Ok(SubmitResponse::success(vec![logs::information_request(
                HOME_AMB,
                MessageId(message_id),
                eth_call_request_selector(),
                HOME_MEDIATOR,
                Bytes::new(),
            )]))
        });
    }
}

fn install_foreign_amb(foreign: &Arc<FakeChain>, ledger: &Arc<Mutex<Ledger>>) {
    let l = ledger.clone();
    foreign.on_submit(
        FOREIGN_AMB,
        IForeignAmb::executeSignaturesCall::SELECTOR,
        move |sub| {
            let call = IForeignAmb::executeSignaturesCall::abi_decode(&sub.input, true)?;
            let signatures = PackedSignatures::unpack(&call.signatures).unwrap_or_default();
            if signatures.len() as u64 != REQUIRED_SIGNATURES || call.encodedData.len() < 36 {
                return Ok(SubmitResponse::reverted());
            }
            let message_id = MessageId(B256::from_slice(&call.encodedData[..32]));
            let payload = &call.encodedData[32..];
            let selector = &payload[..4];

            let mut l = lock(&l);
            let status = if selector == IBridgedMetadata::setBridgedOwnerCall::SELECTOR {
                let update = IBridgedMetadata::setBridgedOwnerCall::abi_decode(payload, true)?;
                l.meta(update.bridgedToken).owner = update.newOwner;
                true
            } else if selector == IBridgedMetadata::setBridgedTokenURICall::SELECTOR {
                let update = IBridgedMetadata::setBridgedTokenURICall::abi_decode(payload, true)?;
                l.meta(update.bridgedToken).uris.insert(update.tokenId, update.uri);
                true
            } else {
                false
            };
            Ok(SubmitResponse::success(vec![logs::relayed_message(
                FOREIGN_AMB,
                message_id,
                status,
            )]))
        },
    );
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_pushed_metadata_reaches_bridged_token() {
    let fx = Fixture::new().await;
    let native = NftToken::erc721(fx.home.clone(), HOME_TOKEN);
    let bridged = NftToken::erc721(fx.foreign.clone(), FOREIGN_BRIDGED);
    let id = U256::from(1);

    native.set_token_uri(id, NEW_URI).await.unwrap();
    native.set_owner(OTHER_USER).await.unwrap();

    for update in [MetadataUpdate::Owner, MetadataUpdate::Erc721Uri(id)] {
        let ticket = fx
            .bridge
            .push_metadata(ChainSide::Home, HOME_TOKEN, update)
            .await
            .unwrap();
        let delivery = fx
            .bridge
            .deliver(&ticket, DeliveryRoute::default_for(ticket.source))
            .await
            .unwrap();
        assert_eq!(delivery.message_id, ticket.message_id);
        assert!(delivery.is_executed(), "{} was not applied", update);
    }

    let err = fx
        .bridge
        .push_metadata(ChainSide::Home, HOME_TOKEN, MetadataUpdate::Erc1155Uri(id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::Correlation(CorrelationError::TransactionReverted { .. })
    ));

    assert_eq!(bridged.owner().await.unwrap(), OTHER_USER);
    assert_eq!(bridged.token_uri(id).await.unwrap(), NEW_URI);
}

#[tokio::test(start_paused = true)]
async fn test_pulled_metadata_answers_each_request() {
    let fx = Fixture::new().await;
    let native = NftToken::erc1155(fx.foreign.clone(), FOREIGN_MULTI_TOKEN);
    let bridged = NftToken::erc1155(fx.home.clone(), HOME_MULTI_BRIDGED);
    let id = U256::from(5);

    // Requests are refused until eth_call requests are enabled
    let err = fx
        .bridge
        .pull_metadata(HOME_MULTI_BRIDGED, MetadataUpdate::Owner)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::Correlation(CorrelationError::TransactionReverted { .. })
    ));

    let owner = fx.home.connect(OWNER);
    fx.bridge
        .enable_async_request_selector(&owner, eth_call_request_selector(), true)
        .await
        .unwrap();

    native.set_owner(OTHER_USER).await.unwrap();
    native.set_token_uri(id, NEW_URI).await.unwrap();

    let mut tickets = Vec::new();
    for update in [
        MetadataUpdate::Owner,
        MetadataUpdate::Erc721Uri(id),
        MetadataUpdate::Erc1155Uri(id),
    ] {
        tickets.push(fx.bridge.pull_metadata(HOME_MULTI_BRIDGED, update).await.unwrap());
    }
    fx.answer_information_requests();

    let mut statuses = Vec::new();
    for ticket in &tickets {
        let delivery = fx.bridge.wait_for_information(ticket).await.unwrap();
        assert_eq!(delivery.message_id, ticket.message_id);
        statuses.push(delivery.status);
    }
    assert_eq!(
        statuses,
        vec![
            DeliveryStatus::Executed,
            DeliveryStatus::Failed,
            DeliveryStatus::Executed
        ]
    );

    assert_eq!(bridged.owner().await.unwrap(), OTHER_USER);
    assert_eq!(bridged.token_uri(id).await.unwrap(), NEW_URI);
}

#[tokio::test(start_paused = true)]
async fn test_enabling_request_selector_requires_owner() {
    let fx = Fixture::new().await;
    let err = fx
        .bridge
        .enable_async_request_selector(fx.home.as_ref(), eth_call_request_selector(), true)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("reverted"));
    assert!(!lock(&fx.ledger).eth_call_enabled);
}
