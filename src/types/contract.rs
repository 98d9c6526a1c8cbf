//! Oracle core contract ABI.
//!
//! Two deployed versions emit different `Requested` events: v1 carries the
//! fulfillment timestamp, v2 leaves it to a fixed settlement offset. The
//! callable surface is shared.

use alloy::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IOrakuruCore {
        struct Request {
            bytes32 id;
            string dataSource;
            string selector;
            address callbackAddr;
            uint256 executionTimestamp;
            bool isFulfilled;
            uint8 aggrType;
            uint8 precision;
        }

        event Requested(
            bytes32 indexed requestId,
            string dataSource,
            string selector,
            address indexed callbackAddr,
            uint8 aggrType,
            uint8 precision,
            uint256 executionTimestamp
        );

        function getPendingRequests() external view returns (bytes32[] memory);

        function requests(bytes32 id) external view returns (Request memory);

        function submitResult(bytes32 _requestId, string calldata _result) external;

        function fulfillRequest(bytes32 _requestId) external;
    }
}

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IOrakuruCoreV1 {
        event Requested(
            bytes32 indexed requestId,
            string dataSource,
            string selector,
            address indexed callbackAddr,
            uint8 aggrType,
            uint8 precision,
            uint256 executionTimestamp,
            uint256 fulfillmentTimestamp
        );
    }
}
