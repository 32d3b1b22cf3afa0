//! NFT Omnibridge and AMB contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe call and event bindings.
//! Calls are ABI-encoded here and sent through a [`crate::chain::ChainHandle`],
//! so no provider-bound contract instances are generated.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Calls and events shared by both AMB deployments
    interface IAmb {
        /// Whether the destination call of a delivered message succeeded
        function messageCallStatus(bytes32 messageId) external view returns (bool);
    }

    /// Home side AMB (validators sign Home -> Foreign messages here)
    interface IHomeAmb {
        function requiredSignatures() external view returns (uint256);

        /// Validator signature `index` collected for `messageHash` (65 bytes, r || s || v)
        function signature(bytes32 messageHash, uint256 index) external view returns (bytes memory);

        /// Home -> Foreign request
        event UserRequestForSignature(bytes32 indexed messageId, bytes encodedData);

        /// Foreign -> Home message executed on Home
        event AffirmationCompleted(
            address indexed sender,
            address indexed executor,
            bytes32 indexed messageId,
            bool status
        );

        /// Enough signatures were collected for a Home -> Foreign message
        event CollectedSignatures(
            address authorityResponsibleForRelay,
            bytes32 messageHash,
            uint256 NumberOfCollectedSignatures
        );

        /// Owner only: allow `requestSelector` in information requests
        function enableAsyncRequestSelector(bytes32 requestSelector, bool enable) external;

        /// Request answered by the validators with data read from the Foreign chain
        event UserRequestForInformation(
            bytes32 indexed messageId,
            bytes32 indexed requestSelector,
            address indexed sender,
            bytes data
        );

        /// Answer of an information request passed to the requester's callback
        event InformationRetrieved(bytes32 indexed messageId, bool status, bool callbackStatus);
    }

    /// Foreign side AMB
    interface IForeignAmb {
        /// Manual execution entry point for Home -> Foreign messages
        function executeSignatures(bytes memory encodedData, bytes memory signatures) external;

        /// Foreign -> Home request
        event UserRequestForAffirmation(bytes32 indexed messageId, bytes encodedData);

        /// Home -> Foreign message executed on Foreign
        event RelayedMessage(
            address indexed sender,
            address indexed executor,
            bytes32 indexed messageId,
            bool status
        );
    }

    /// Home/Foreign NFT mediator
    #[derive(Debug)]
    interface INftMediator {
        function bridgeContract() external view returns (address);
        function isTokenRegistered(address token) external view returns (bool);
        function bridgedTokenAddress(address nativeToken) external view returns (address);
        function nativeTokenAddress(address bridgedToken) external view returns (address);
        function mediatorOwns(address token, uint256 tokenId) external view returns (uint256);
        function messageFixed(bytes32 messageId) external view returns (bool);

        function requestFailedMessageFix(
            bytes32 messageId,
            address token,
            address sender,
            uint256[] memory tokenIds,
            uint256[] memory values
        ) external;

        /// Delivered from the other side as the payload of a fix request
        function fixFailedMessage(
            bytes32 messageId,
            address token,
            address sender,
            uint256[] memory tokenIds,
            uint256[] memory values
        ) external;

        function fixMediatorBalanceERC721(address token, address receiver, uint256[] memory tokenIds) external;

        function fixMediatorBalanceERC1155(
            address token,
            address receiver,
            uint256[] memory tokenIds,
            uint256[] memory values
        ) external;

        function disableTokenExecution(address token, bool disable) external;

        /// Native side: send the token's current metadata to its bridged copy
        function pushTokenOwnerUpdate(address token) external;
        function pushERC721URIUpdate(address token, uint256 tokenId) external;
        function pushERC1155URIUpdate(address token, uint256 tokenId) external;

        /// Bridged side (Home only): ask for the native token's metadata
        function pullTokenOwnerUpdate(address bridgedToken) external;
        function pullERC721URIUpdate(address bridgedToken, uint256 tokenId) external;
        function pullERC1155URIUpdate(address bridgedToken, uint256 tokenId) external;

        event TokensBridgingInitiated(
            address indexed token,
            address indexed sender,
            uint256[] tokenIds,
            uint256[] values,
            bytes32 indexed messageId
        );

        event TokensBridged(
            address indexed token,
            address indexed recipient,
            uint256[] tokenIds,
            uint256[] values,
            bytes32 indexed messageId
        );

        event FailedMessageFixed(
            bytes32 indexed messageId,
            address token,
            address recipient,
            uint256[] tokenIds,
            uint256[] values
        );
    }

    /// Bridgeable ERC-721 test token
    interface IERC721Bridgeable {
        function mint(address to, uint256 tokenId) external;
        function ownerOf(uint256 tokenId) external view returns (address);
        function balanceOf(address owner) external view returns (uint256);
        function transferFrom(address from, address to, uint256 tokenId) external;
        function safeTransferFrom(address from, address to, uint256 tokenId, bytes data) external;
        function owner() external view returns (address);
        function setOwner(address newOwner) external;
        function tokenURI(uint256 tokenId) external view returns (string memory);
        function setTokenURI(uint256 tokenId, string memory newTokenURI) external;

        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }

    /// Bridgeable ERC-1155 test token
    interface IERC1155Bridgeable {
        function mint(address to, uint256[] memory tokenIds, uint256[] memory values) external;
        function balanceOf(address account, uint256 id) external view returns (uint256);
        function safeTransferFrom(address from, address to, uint256 id, uint256 value, bytes data) external;
        function owner() external view returns (address);
        function setOwner(address newOwner) external;
        function uri(uint256 id) external view returns (string memory);
        function setTokenURI(uint256 id, string memory newTokenURI) external;

        event TransferSingle(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256 id,
            uint256 value
        );

        event TransferBatch(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256[] ids,
            uint256[] values
        );
    }
}
