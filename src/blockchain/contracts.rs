use alloy::sol;

sol! {
    #[derive(Debug)]
    event Deposit(bytes32 indexed commitment, uint32 leafIndex, uint256 timestamp);

    #[derive(Debug)]
    event Withdrawal(address to, bytes32 nullifierHash, address indexed relayer, uint256 fee);

    #[derive(Debug)]
    event EncryptedNote(address indexed sender, bytes encryptedNote);

    #[derive(Debug)]
    event RelayerRegistered(string hostName, address relayerAddress, uint256 stakedAmount);

    #[derive(Debug)]
    event Echo(address indexed who, bytes data);

    #[derive(Debug)]
    event Delegated(address indexed account, address indexed to);

    #[derive(Debug)]
    event Undelegated(address indexed account, address indexed from);
}

sol! {
    interface IInstanceRegistry {
        function getAllInstanceAddresses() external view returns (address[] memory);

        function instances(address instance)
            external
            view
            returns (
                bool isERC20,
                address token,
                uint256 denomination,
                uint8 state,
                uint24 poolSwappingFee,
                uint32 protocolFeePercentage
            );
    }
}

sol! {
    #[derive(Debug)]
    struct Call3 {
        address target;
        bool allowFailure;
        bytes callData;
    }

    #[derive(Debug)]
    struct CallResult {
        bool success;
        bytes returnData;
    }

    interface IMulticall3 {
        function aggregate3(Call3[] calls) external payable returns (CallResult[] memory returnData);
    }
}

/// `state` value the registry reports for instances that accept deposits.
pub const INSTANCE_STATE_ENABLED: u8 = 1;
