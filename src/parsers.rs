//! Closed set of account decoders
//!
//! Every account kind the pipeline reads decodes into one `AccountRecord`
//! variant. Mints and token accounts use the SPL layouts; DEX market and
//! order-book accounts are decoded at fixed offsets of the Serum v3 state.
//! A decoded market *declares* its four related accounts and their required
//! decoders via `related_accounts` so the cache can plan follow-up fetches
//! instead of mutating a registry inline.

use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::{Account as SplAccount, Mint as SplMint};

use crate::errors::{AggregatorError, AggregatorResult};
use crate::types::MintRecord;

/// Serum DEX v3 program
pub const DEX_PROGRAM_V3: Pubkey = pubkey!("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin");

pub const MINT_ACCOUNT_LEN: usize = SplMint::LEN; // 82
pub const TOKEN_ACCOUNT_LEN: usize = SplAccount::LEN; // 165
pub const MARKET_STATE_LEN: usize = 388;

// Account flag bits shared by all Serum state accounts
const FLAG_INITIALIZED: u64 = 0x01;
const FLAG_MARKET: u64 = 0x02;
const FLAG_BIDS: u64 = 0x20;
const FLAG_ASKS: u64 = 0x40;

// Serum slab geometry: 5-byte head padding + 8-byte flags, 32-byte slab
// header, 72-byte nodes, 7-byte tail padding
const BOOK_PREFIX_LEN: usize = 13;
const SLAB_HEADER_LEN: usize = 32;
const SLAB_NODE_LEN: usize = 72;
const BOOK_SUFFIX_LEN: usize = 7;
const LEAF_NODE_TAG: u32 = 2;

/// Decode function selector; registered per address in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    Mint,
    TokenAccount,
    DexMarket,
    OrderBook,
}

/// SPL token account fields the pipeline consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountRecord {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

/// Serum market state fields the pipeline consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexMarketRecord {
    pub own_address: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub base_lot_size: u64,
    pub quote_lot_size: u64,
    pub program_id: Pubkey,
}

impl DexMarketRecord {
    /// The accounts a decoded market depends on, with the decoder each one
    /// requires. Consumed by the cache to register parsers ahead of the
    /// follow-up batch fetch.
    pub fn related_accounts(&self) -> [(Pubkey, ParserKind); 4] {
        [
            (self.base_mint, ParserKind::Mint),
            (self.quote_mint, ParserKind::Mint),
            (self.bids, ParserKind::OrderBook),
            (self.asks, ParserKind::OrderBook),
        ]
    }
}

/// One live price level of an order-book slab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookLevel {
    pub price_lots: u64,
    pub quantity: u64,
}

/// Decoded order-book side; only top-of-book (L2 depth 1) is consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookRecord {
    pub flags: u64,
    pub levels: Vec<BookLevel>,
}

impl OrderBookRecord {
    pub fn is_bids(&self) -> bool {
        self.flags & FLAG_BIDS != 0
    }

    pub fn is_asks(&self) -> bool {
        self.flags & FLAG_ASKS != 0
    }

    /// Best price in lots: highest key for bids, lowest for asks.
    /// `None` when the book has no levels.
    pub fn best_price_lots(&self) -> Option<u64> {
        let prices = self.levels.iter().map(|l| l.price_lots);
        if self.is_bids() {
            prices.max()
        } else {
            prices.min()
        }
    }
}

/// Decoded account state, one variant per record kind
#[derive(Debug, Clone)]
pub enum AccountRecord {
    Mint(MintRecord),
    TokenAccount(TokenAccountRecord),
    DexMarket(DexMarketRecord),
    OrderBook(OrderBookRecord),
}

/// An account owned by the cache: raw bytes plus the decoded record
#[derive(Debug, Clone)]
pub struct ParsedAccount {
    pub address: Pubkey,
    pub raw: Vec<u8>,
    pub record: AccountRecord,
}

/// Decode raw account bytes with the given parser
pub fn decode(kind: ParserKind, address: &Pubkey, data: &[u8]) -> AggregatorResult<ParsedAccount> {
    let record = match kind {
        ParserKind::Mint => AccountRecord::Mint(decode_mint(address, data)?),
        ParserKind::TokenAccount => AccountRecord::TokenAccount(decode_token_account(address, data)?),
        ParserKind::DexMarket => AccountRecord::DexMarket(decode_market(address, data)?),
        ParserKind::OrderBook => AccountRecord::OrderBook(decode_orderbook(address, data)?),
    };
    Ok(ParsedAccount {
        address: *address,
        raw: data.to_vec(),
        record,
    })
}

/// Decode an SPL mint account
pub fn decode_mint(address: &Pubkey, data: &[u8]) -> AggregatorResult<MintRecord> {
    if data.len() != MINT_ACCOUNT_LEN {
        return Err(AggregatorError::decode(
            *address,
            format!("not a valid mint, size {}", data.len()),
        ));
    }
    let mint = SplMint::unpack_unchecked(data)
        .map_err(|e| AggregatorError::decode(*address, e.to_string()))?;
    Ok(MintRecord {
        mint_authority: mint.mint_authority.into(),
        supply: mint.supply,
        decimals: mint.decimals,
        is_initialized: mint.is_initialized,
        freeze_authority: mint.freeze_authority.into(),
    })
}

/// Decode an SPL token account
pub fn decode_token_account(address: &Pubkey, data: &[u8]) -> AggregatorResult<TokenAccountRecord> {
    if data.len() != TOKEN_ACCOUNT_LEN {
        return Err(AggregatorError::decode(
            *address,
            format!("not a valid token account, size {}", data.len()),
        ));
    }
    let account = SplAccount::unpack_unchecked(data)
        .map_err(|e| AggregatorError::decode(*address, e.to_string()))?;
    Ok(TokenAccountRecord {
        mint: account.mint,
        owner: account.owner,
        amount: account.amount,
    })
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap())
}

fn read_u128(data: &[u8], offset: usize) -> u128 {
    u128::from_le_bytes(data[offset..offset + 16].try_into().unwrap())
}

fn read_pubkey(data: &[u8], offset: usize) -> Pubkey {
    Pubkey::new_from_array(data[offset..offset + 32].try_into().unwrap())
}

/// Decode a Serum v3 market state account at fixed offsets:
/// 5-byte head padding, account flags, then the market blob fields.
pub fn decode_market(address: &Pubkey, data: &[u8]) -> AggregatorResult<DexMarketRecord> {
    if data.len() < MARKET_STATE_LEN {
        return Err(AggregatorError::decode(
            *address,
            format!("market state too short, size {}", data.len()),
        ));
    }

    let flags = read_u64(data, 5);
    if flags & (FLAG_INITIALIZED | FLAG_MARKET) != (FLAG_INITIALIZED | FLAG_MARKET) {
        return Err(AggregatorError::decode(
            *address,
            format!("account flags {:#x} are not a market", flags),
        ));
    }

    Ok(DexMarketRecord {
        own_address: read_pubkey(data, 13),
        base_mint: read_pubkey(data, 53),
        quote_mint: read_pubkey(data, 85),
        bids: read_pubkey(data, 285),
        asks: read_pubkey(data, 317),
        base_lot_size: read_u64(data, 349),
        quote_lot_size: read_u64(data, 357),
        program_id: DEX_PROGRAM_V3,
    })
}

/// Decode a Serum order-book slab, keeping the live leaf price levels.
/// The tree links are not needed to answer top-of-book: the best bid is
/// the maximum leaf key and the best ask the minimum.
pub fn decode_orderbook(address: &Pubkey, data: &[u8]) -> AggregatorResult<OrderBookRecord> {
    if data.len() < BOOK_PREFIX_LEN + SLAB_HEADER_LEN + BOOK_SUFFIX_LEN {
        return Err(AggregatorError::decode(
            *address,
            format!("order book too short, size {}", data.len()),
        ));
    }

    let flags = read_u64(data, 5);
    if flags & (FLAG_BIDS | FLAG_ASKS) == 0 {
        return Err(AggregatorError::decode(
            *address,
            format!("account flags {:#x} are not an order book side", flags),
        ));
    }

    let bump_index =
        u32::from_le_bytes(data[BOOK_PREFIX_LEN..BOOK_PREFIX_LEN + 4].try_into().unwrap()) as usize;
    let nodes = &data[BOOK_PREFIX_LEN + SLAB_HEADER_LEN..data.len() - BOOK_SUFFIX_LEN];
    let node_count = bump_index.min(nodes.len() / SLAB_NODE_LEN);

    let mut levels = Vec::new();
    for i in 0..node_count {
        let node = &nodes[i * SLAB_NODE_LEN..(i + 1) * SLAB_NODE_LEN];
        let tag = u32::from_le_bytes(node[0..4].try_into().unwrap());
        if tag != LEAF_NODE_TAG {
            continue;
        }
        // Leaf key packs the price in its upper 64 bits
        let key = read_u128(node, 8);
        levels.push(BookLevel {
            price_lots: (key >> 64) as u64,
            quantity: read_u64(node, 56),
        });
    }

    Ok(OrderBookRecord { flags, levels })
}
