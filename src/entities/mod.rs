pub mod address;
pub mod admin_wallet;
pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod producer_wallet;
pub mod product;
pub mod push_token;
pub mod wallet_transaction;

pub use address::Entity as Address;
pub use admin_wallet::Entity as AdminWallet;
pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use producer_wallet::Entity as ProducerWallet;
pub use product::Entity as Product;
pub use push_token::Entity as PushToken;
pub use wallet_transaction::Entity as WalletTransaction;
