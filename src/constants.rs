use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::HashMap;

// Replay paging
pub const DEFAULT_PAGE_SIZE: u64 = 1_000;
pub const DEFAULT_MAX_EMPTY_PAGES: u32 = 5;

// On-chain fixed point scales
pub const ZKLEND_SCALE_DECIMALS: u32 = 27;
pub const NOSTRA_SCALE_DECIMALS: u32 = 18;

// Zero address as emitted by mint/burn style transfers
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

// zkLend
pub const ZKLEND_MARKET: &str = "0x04c0a5193d58f74fbace4b74dcf65481e734ed1714121bdc571da345540efa05";

// Nostra Alpha
pub const NOSTRA_ALPHA_INTEREST_RATE_MODEL: &str =
    "0x03d39f7248fb2bfb960275746470f7fb470317350ad8656249ec66067559e892";
pub const NOSTRA_ALPHA_CDP_MANAGER: &str =
    "0x06d272e18e66289eeb874d0206a23afba148ef35f250accfdfdca085a478aec0";
pub const NOSTRA_ALPHA_DEFERRED_BATCH_CALL_ADAPTER: &str =
    "0x05a0042fa9bb87ed72fbee4d5a2da416528ebc84a569081ad02e9ad60b0af7d7";

// Nostra Mainnet
pub const NOSTRA_MAINNET_INTEREST_RATE_MODEL: &str =
    "0x059a943ca214c10234b9a3b61c558ac20c005127d183b86a99a8f3c60a08b4ff";
pub const NOSTRA_MAINNET_CDP_MANAGER: &str =
    "0x073f6addc9339de9822cab4dac8c9431779c09077f02ba7bc36904ea342dd9eb";
pub const NOSTRA_MAINNET_IGNORED_USER: &str =
    "0x05fc7053cca20fcb38550d7554c84fa6870e2b9e7ebd66398a67697ba440f12b";

// Hashstack
pub const HASHSTACK_V0_ADDRESS: &str = "0x03dcf5c72ba60eb7b2fe151032769d49dd3df6b04fa3141dffd6e2aa162b7a6e";

/// 기초 자산 토큰 (symbol, address, decimals)
pub const UNDERLYING_TOKENS: &[(&str, &str, u32)] = &[
    ("ETH", "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7", 18),
    ("WBTC", "0x03fe2b97c1fd336e750087d68b9b867997fd64a2661ff3ca5a7c771641e8e7ac", 8),
    ("USDC", "0x053c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8", 6),
    ("DAI", "0x00da114221cb83fa859dbdb4c44beeaa0bb37c7537ad5ae66fe5e0efd20e6eb3", 18),
    ("USDT", "0x068f5c6a61780768455de69077e07e89787839bf8166decfbf92b645209c0fb8", 6),
    ("wstETH", "0x042b8f0484674ca266ac5d08e4ac6a3fe65bd3129795def2dca5c34ecc5f96d2", 18),
    ("LORDS", "0x0124aeb495b947201f5fac96fd1138e326ad86195b98df6dec9009158a533b49", 18),
    ("STRK", "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d", 18),
    ("nstSTRK", "0x04619e9ce4109590219c5263787050726be63382148538f3f936c22aa87d2fc2", 18),
    ("UNO", "0x0719b5092403233201aa822ce928bd4b551d0cdb071a724edd7dc5e5f57b7f34", 18),
];

/// Nostra Alpha 토큰 (symbol, address, underlying symbol)
pub const NOSTRA_ALPHA_TOKENS: &[(&str, &str, &str)] = &[
    ("iWBTC-c", "0x00687b5d9e591844169bc6ad7d7256c4867a10cee6599625b9d78ea17a7caef9", "WBTC"),
    ("nWBTC-c", "0x06b59e2a746e141f90ec8b6e88e695265567ab3bdcf27059b4a15c89b0b7bd53", "WBTC"),
    ("dWBTC", "0x075b0d87aca8dee25df35cdc39a82b406168fa23a76fc3f03abbfdc6620bb6d7", "WBTC"),
    ("iETH-c", "0x070f8a4fcd75190661ca09a7300b7c93fab93971b67ea712c664d7948a8a54c6", "ETH"),
    ("nETH-c", "0x0553cea5d1dc0e0157ffcd36a51a0ced717efdadd5ef1b4644352bb45bd35453", "ETH"),
    ("dETH", "0x040b091cb020d91f4a4b34396946b4d4e2a450dbd9410432ebdbfe10e55ee5e5", "ETH"),
    ("iUSDC-c", "0x029959a546dda754dc823a7b8aa65862c5825faeaaf7938741d8ca6bfdc69e4e", "USDC"),
    ("nUSDC-c", "0x047e794d7c49c49fd2104a724cfa69a92c5a4b50a5753163802617394e973833", "USDC"),
    ("dUSDC", "0x03b6058a9f6029b519bc72b2cc31bcb93ca704d0ab79fec2ae5d43f79ac07f7a", "USDC"),
    ("iDAI-c", "0x01ac55cabf2b79cf39b17ba0b43540a64205781c4b7850e881014aea6f89be58", "DAI"),
    ("nDAI-c", "0x04403e420521e7a4ca0dc5192af81ca0bb36de343564a9495e11c8d9ba6e9d17", "DAI"),
    ("dDAI", "0x0362b4455f5f4cc108a5a1ab1fd2cc6c4f0c70597abb541a99cf2734435ec9cb", "DAI"),
    ("iUSDT-c", "0x055ba2baf189b98c59f6951a584a3a7d7d6ff2c4ef88639794e739557e1876f0", "USDT"),
    ("nUSDT-c", "0x003cd2066f3c8b4677741b39db13acebba843bbbaa73d657412102ab4fd98601", "USDT"),
    ("dUSDT", "0x065c6c7119b738247583286021ea05acc6417aa86d391dcdda21843c1fc6e9c6", "USDT"),
];

/// Nostra Mainnet 토큰 (symbol, address, underlying symbol)
pub const NOSTRA_MAINNET_TOKENS: &[(&str, &str, &str)] = &[
    ("iWBTC-c", "0x05b7d301fa769274f20e89222169c0fad4d846c366440afc160aafadd6f88f0c", "WBTC"),
    ("nWBTC-c", "0x036b68238f3a90639d062669fdec08c4d0bdd09826b1b6d24ef49de6d8141eaa", "WBTC"),
    ("dWBTC", "0x0491480f21299223b9ce770f23a2c383437f9fbf57abc2ac952e9af8cdb12c97", "WBTC"),
    ("iETH-c", "0x057146f6409deb4c9fa12866915dd952aa07c1eb2752e451d7f3b042086bdeb8", "ETH"),
    ("nETH-c", "0x044debfe17e4d9a5a1e226dabaf286e72c9cc36abbe71c5b847e669da4503893", "ETH"),
    ("dETH", "0x00ba3037d968790ac486f70acaa9a1cab10cf5843bb85c986624b4d0e5a82e74", "ETH"),
    ("iUSDC-c", "0x05dcd26c25d9d8fd9fc860038dcb6e4d835e524eb8a85213a8cda5b7fff845f6", "USDC"),
    ("nUSDC-c", "0x05f296e1b9f4cf1ab452c218e72e02a8713cee98921dad2d3b5706235e128ee4", "USDC"),
    ("dUSDC", "0x063d69ae657bd2f40337c39bf35a870ac27ddf91e6623c2f52529db4c1619a51", "USDC"),
    ("iDAI-c", "0x04f18ffc850cdfa223a530d7246d3c6fc12a5969e0aa5d4a88f470f5fe6c46e9", "DAI"),
    ("nDAI-c", "0x005c4676bcb21454659479b3cd0129884d914df9c9b922c1c649696d2e058d70", "DAI"),
    ("dDAI", "0x066037c083c33330a8460a65e4748ceec275bbf5f28aa71b686cbc0010e12597", "DAI"),
    ("iUSDT-c", "0x0453c4c996f1047d9370f824d68145bd5e7ce12d00437140ad02181e1d11dc83", "USDT"),
    ("nUSDT-c", "0x0514bd7ee8c97d4286bd481c54aa0793e43edbfb7e1ab9784c4b30469dcf9313", "USDT"),
    ("dUSDT", "0x024e9b0d6bc79e111e6872bb1ada2a874c25712cf08dfc5bcf0de008a7cca55f", "USDT"),
    ("iwstETH-c", "0x009377fdde350e01e0397820ea83ed3b4f05df30bfb8cf8055d62cafa1b2106a", "wstETH"),
    ("nwstETH-c", "0x05eb6de9c7461b3270d029f00046c8a10d27d4f4a4c931a4ea9769c72ef4edbb", "wstETH"),
    ("dwstETH", "0x0348cc417fc877a7868a66510e8e0d0f3f351f5e6b0886a86b652fcb30a3d1fb", "wstETH"),
    ("iLORDS-c", "0x0739760bce37f89b6c1e6b1198bb8dc7166b8cf21509032894f912c9d5de9cbd", "LORDS"),
    ("nLORDS-c", "0x02530a305dd3d92aad5cf97e373a3d07577f6c859337fb0444b9e851ee4a2dd4", "LORDS"),
    ("dLORDS", "0x035778d24792bbebcf7651146896df5f787641af9e2a3db06480a637fbc9fff8", "LORDS"),
    ("iSTRK-c", "0x07c2e1e733f28daa23e78be3a4f6c724c0ab06af65f6a95b5e0545215f1abc1b", "STRK"),
    ("nSTRK-c", "0x040f5a6b7a6d3c472c12ca31ae6250b462c6d35bbdae17bd52f6c6ca065e30cf", "STRK"),
    ("dSTRK", "0x001258eae3eae5002125bebf062d611a772e8aea3a1879b64a19f363ebd00947", "STRK"),
    ("instSTRK-c", "0x067a34ff63ec38d0ccb2817c6d3f01e8b0c4792c77845feb43571092dcf5ebb5", "nstSTRK"),
    ("nnstSTRK-c", "0x0142af5b6c97f02cac9c91be1ea9895d855c5842825cb2180673796e54d73dc5", "nstSTRK"),
    ("dnstSTRK", "0x0292be6baee291a148006db984f200dbdb34b12fb2136c70bfe88649c12d934b", "nstSTRK"),
    ("iUNO-c", "0x02a3a9d7bcecc6d3121e3b6180b73c7e8f4c5f81c35a90c8dd457a70a842b723", "UNO"),
    ("nUNO-c", "0x07d717fb27c9856ea10068d864465a2a8f9f669f4f78013967de06149c09b9af", "UNO"),
    ("dUNO", "0x04b036839a8769c04144cc47415c64b083a2b26e4a7daa53c07f6042a0d35792", "UNO"),
];

/// Hashstack V1 rToken (symbol, address, underlying symbol)
pub const HASHSTACK_V1_R_TOKENS: &[(&str, &str, &str)] = &[
    ("rETH", "0x00436d8d078de345c11493bd91512eae60cd2713e05bcaa0bb9f0cba90358c6e", "ETH"),
    ("rUSDC", "0x03bcecd40212e9b91d92bbe25bb3643ad93f0d230d93237c675f46fac5187e8c", "USDC"),
    ("rUSDT", "0x05fa6cc6185eab4b0264a4134e2d4e74be11205351c7c91196cb27d5d97f8d21", "USDT"),
    ("rDAI", "0x019c981ec23aa9cbac1cc1eb7f92cf09ea2816db9cbd932e251c86a2e8fb725f", "DAI"),
    ("rWBTC", "0x01320a9910e78afc18be65e4080b51ecc0ee5c0a8b6cc7ef4e685e02b50e57ef", "WBTC"),
];

/// Hashstack V1 dToken (symbol, address, underlying symbol)
pub const HASHSTACK_V1_D_TOKENS: &[(&str, &str, &str)] = &[
    ("dETH", "0x01ef7f9f8bf01678dc6d27e2c26fb7e8eac3812a24752e6a1d6a49d153bec9f3", "ETH"),
    ("dUSDC", "0x021d8d8519f5464ec63c6b9a80a5229c5ddeed57ecded4c8a9dfc34e31b49990", "USDC"),
    ("dUSDT", "0x012b8185e237dd0340340faeb3351dbe53f8a42f5a9bf974ddf90ced56e301c7", "USDT"),
    ("dDAI", "0x07eeed99c095f83716e465e2c52a3ec8f47b323041ddc4f97778ac0393b7f358", "DAI"),
    ("dWBTC", "0x02614c784267d2026042ab98588f90efbffaade8982567e93530db4ed41201cf", "WBTC"),
];

/// Hashstack V1 차입 담보로 쓰이는 AMM LP 토큰 (symbol, address, decimals)
pub const HASHSTACK_V1_POOL_TOKENS: &[(&str, &str, u32)] = &[
    ("JediSwap: DAI/ETH Pool", "0x07e2a13b40fc1119ec55e0bcf9428eedaa581ab3c924561ad4e955f95da63138", 18),
    ("JediSwap: DAI/USDC Pool", "0x00cfd39f5244f7b617418c018204a8a9f9a7f72e71f0ef38f968eeb2a9ca302b", 18),
    ("JediSwap: DAI/USDT Pool", "0x00f0f5b3eed258344152e1f17baf84a2e1b621cd754b625bec169e8595aea767", 18),
    ("JediSwap: ETH/USDC Pool", "0x04d0390b777b424e43839cd1e744799f3de6c176c7e32c1812a41dbd9c19db6a", 18),
    ("JediSwap: ETH/USDT Pool", "0x045e7131d776dddc137e30bdd490b431c7144677e97bf9369f629ed8d3fb7dd6", 18),
    ("JediSwap: USDC/USDT Pool", "0x05801bdad32f343035fb242e98d1e9371ae85bc1543962fedea16c59b35bd19b", 18),
    ("JediSwap: WBTC/ETH Pool", "0x0260e98362e0949fefff8b4de85367c035e44f734c9f8069b6ce2075ae86b45c", 18),
    ("JediSwap: WBTC/USDC Pool", "0x005a8054e5ca0b277b295a830e53bd71a6a6943b42d0dbb22329437522bc80c8", 18),
    ("JediSwap: WBTC/USDT Pool", "0x044d13ad98a46fd2322ef2637e5e4c292ce8822f47b7cb9a1d581176a801c1a0", 18),
    ("mySwap: DAI/ETH Pool", "0x07c662b10f409d7a0a69c8da79b397fd91187ca5f6230ed30effef2dceddc5b3", 18),
    ("mySwap: DAI/USDC Pool", "0x0611e8f4f3badf1737b9e8f0ca77dd2f6b46a1d33ce4eed951c6b18ac497d505", 12),
    ("mySwap: ETH/USDC Pool", "0x022b05f9396d2c48183f6deaf138a57522bcc8b35b67dee919f76403d1783136", 12),
    ("mySwap: ETH/USDT Pool", "0x041f9a1e9a4d924273f5a5c0c138d52d66d2e6a8bee17412c6b0f48fe059ae04", 12),
    ("mySwap: USDC/USDT Pool", "0x01ea237607b7d9d2e9997aa373795929807552503683e35d8739f4dc46652de1", 6),
    ("mySwap: WBTC/USDC Pool", "0x025b392609604c75d62dde3d6ae98e124a31b49123b8366d7ce0066ccb94f696", 7),
];

/// 기본 반올림 오차 허용치 (raw 단위)
pub static DEFAULT_MAX_ROUNDING_ERROR: Lazy<Decimal> = Lazy::new(|| Decimal::new(5_000_000_000_000, 0));

/// 토큰별 반올림 오차 허용치. 이 값보다 작은 잔고는 0으로 스냅된다.
pub static MAX_ROUNDING_ERRORS: Lazy<HashMap<&'static str, Decimal>> = Lazy::new(|| {
    let by_underlying: HashMap<&str, Decimal> = [
        ("ETH", Decimal::new(5_000_000_000_000, 0)),
        ("WBTC", Decimal::new(100, 0)),
        ("USDC", Decimal::new(10_000, 0)),
        ("DAI", Decimal::new(10_000_000_000_000_000, 0)),
        ("USDT", Decimal::new(10_000, 0)),
        ("wstETH", Decimal::new(5_000_000_000_000, 0)),
        ("LORDS", Decimal::new(5_000_000_000_000, 0)),
        ("STRK", Decimal::new(5_000_000_000_000, 0)),
    ]
    .into_iter()
    .collect();

    let mut thresholds = HashMap::new();
    for (symbol, address, _) in UNDERLYING_TOKENS {
        if let Some(threshold) = by_underlying.get(symbol) {
            thresholds.insert(*address, *threshold);
        }
    }
    // Nostra 토큰은 기초 자산과 같은 허용치를 쓴다. LORDS 계열만 예외로 1e16.
    for (symbol, address, underlying) in NOSTRA_ALPHA_TOKENS.iter().chain(NOSTRA_MAINNET_TOKENS) {
        let threshold = if symbol.contains("LORDS") {
            Decimal::new(10_000_000_000_000_000, 0)
        } else {
            by_underlying.get(underlying).copied().unwrap_or(*DEFAULT_MAX_ROUNDING_ERROR)
        };
        thresholds.insert(*address, threshold);
    }
    thresholds
});

/// 토큰 주소의 반올림 오차 허용치
pub fn max_rounding_error(token: &str) -> Decimal {
    MAX_ROUNDING_ERRORS
        .get(token)
        .copied()
        .unwrap_or(*DEFAULT_MAX_ROUNDING_ERROR)
}

/// 기초 자산 심볼로 주소 조회
pub fn underlying_address(symbol: &str) -> Option<&'static str> {
    UNDERLYING_TOKENS
        .iter()
        .find(|(s, _, _)| *s == symbol)
        .map(|(_, address, _)| *address)
}

/// 기초 자산 주소로 (심볼, 소수점) 조회
pub fn underlying_token(address: &str) -> Option<(&'static str, u32)> {
    UNDERLYING_TOKENS
        .iter()
        .find(|(_, a, _)| *a == address)
        .map(|(symbol, _, decimals)| (*symbol, *decimals))
}
