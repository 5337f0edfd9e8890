//! In-memory commerce store backed by DashMap.
//!
//! Production: replace with the hosted backend's REST/SQL client behind the
//! same `CommerceStore` trait. This provides the same API surface for
//! development and testing.

use crate::traits::CommerceStore;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use storefront_core::catalog::{Address, NewOrder, Order, OrderItem, OrderStatus, Product, ProductId};
use storefront_core::notification::{Notification, PushSubscription};
use storefront_core::promotion::ScheduledFlashSale;
use storefront_core::subscription::*;
use storefront_core::{StorefrontError, StorefrontResult};
use tracing::{debug, info};
use uuid::Uuid;

/// Thread-safe in-memory store for catalog, subscriptions, orders, audit trail,
/// flash sales and push endpoints.
pub struct MemoryStore {
    products: DashMap<ProductId, Product>,
    addresses: DashMap<Uuid, Address>,
    subscriptions: DashMap<Uuid, Subscription>,
    subscription_items: DashMap<Uuid, Vec<SubscriptionItem>>,
    tiers: RwLock<Vec<SubscriptionTier>>,
    settings: RwLock<Option<DiscountSettings>>,
    tier_assignments: DashMap<Uuid, TierAssignment>,
    orders: DashMap<Uuid, Order>,
    order_items: DashMap<Uuid, Vec<OrderItem>>,
    subscription_orders: Mutex<Vec<SubscriptionOrder>>,
    notifications: Mutex<Vec<Notification>>,
    flash_sales: DashMap<i64, ScheduledFlashSale>,
    push_subscriptions: DashMap<Uuid, PushSubscription>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            products: DashMap::new(),
            addresses: DashMap::new(),
            subscriptions: DashMap::new(),
            subscription_items: DashMap::new(),
            tiers: RwLock::new(Vec::new()),
            settings: RwLock::new(None),
            tier_assignments: DashMap::new(),
            orders: DashMap::new(),
            order_items: DashMap::new(),
            subscription_orders: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            flash_sales: DashMap::new(),
            push_subscriptions: DashMap::new(),
        }
    }

    /// Create a store seeded with a small demo catalog whose subscriptions
    /// fall due on `today`.
    pub fn with_demo_data(today: NaiveDate) -> Self {
        info!("Commerce store initialized (in-memory, development mode)");
        let store = Self::new();
        store.seed_demo_data(today);
        store
    }

    // ─── Setup & admin writes ──────────────────────────────────────────────

    pub fn insert_product(&self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn insert_address(&self, address: Address) {
        self.addresses.insert(address.id, address);
    }

    /// Store a subscription with its items. A repeated product replaces the
    /// earlier line, keeping items unique per (subscription, product).
    pub fn create_subscription(&self, subscription: Subscription, items: Vec<(ProductId, u32)>) {
        let mut lines: Vec<SubscriptionItem> = Vec::with_capacity(items.len());
        for (product_id, quantity) in items {
            lines.retain(|l| l.product_id != product_id);
            lines.push(SubscriptionItem {
                subscription_id: subscription.id,
                product_id,
                quantity,
            });
        }
        self.subscription_items.insert(subscription.id, lines);
        self.subscriptions.insert(subscription.id, subscription);
    }

    pub fn set_subscription_active(&self, id: Uuid, active: bool) -> bool {
        self.subscriptions
            .get_mut(&id)
            .map(|mut s| s.is_active = active)
            .is_some()
    }

    pub fn set_tiers(&self, tiers: Vec<SubscriptionTier>) {
        *self.tiers.write() = tiers;
    }

    pub fn set_discount_settings(&self, settings: DiscountSettings) {
        *self.settings.write() = Some(settings);
    }

    pub fn insert_flash_sale(&self, sale: ScheduledFlashSale) {
        self.flash_sales.insert(sale.id, sale);
    }

    pub fn register_push_subscription(&self, subscription: PushSubscription) {
        self.push_subscriptions.insert(subscription.id, subscription);
    }

    // ─── Read helpers ──────────────────────────────────────────────────────

    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.products.get(&id).map(|r| r.value().clone())
    }

    pub fn subscription(&self, id: Uuid) -> Option<Subscription> {
        self.subscriptions.get(&id).map(|r| r.value().clone())
    }

    pub fn flash_sale(&self, id: i64) -> Option<ScheduledFlashSale> {
        self.flash_sales.get(&id).map(|r| r.value().clone())
    }

    pub fn orders_for_user(&self, user_id: Uuid) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|r| r.value().user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        orders
    }

    pub fn order_items(&self, order_id: Uuid) -> Vec<OrderItem> {
        self.order_items
            .get(&order_id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    pub fn audit_records(&self, subscription_id: Uuid) -> Vec<SubscriptionOrder> {
        self.subscription_orders
            .lock()
            .iter()
            .filter(|r| r.subscription_id == subscription_id)
            .cloned()
            .collect()
    }

    pub fn notifications_for(&self, user_id: Uuid) -> Vec<Notification> {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    fn join(&self, subscription: Subscription) -> DueSubscription {
        let lines: Vec<SubscriptionLine> = self
            .subscription_items
            .get(&subscription.id)
            .map(|items| {
                items
                    .iter()
                    .map(|item| SubscriptionLine {
                        item: item.clone(),
                        product: self.product(item.product_id),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let address = subscription
            .address_id
            .and_then(|id| self.addresses.get(&id).map(|r| r.value().clone()));
        DueSubscription {
            subscription,
            lines,
            address,
        }
    }

    fn select_active<F>(&self, predicate: F) -> Vec<DueSubscription>
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut selected: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|r| r.value().is_active && predicate(r.value()))
            .map(|r| r.value().clone())
            .collect();
        selected.sort_by(|a, b| {
            a.next_delivery_date
                .cmp(&b.next_delivery_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        selected.into_iter().map(|s| self.join(s)).collect()
    }

    // ─── Demo seed ─────────────────────────────────────────────────────────

    /// Seed demo data: 4 tiers, 5 products, 1 customer with 2 subscriptions,
    /// and an upcoming flash sale.
    pub fn seed_demo_data(&self, today: NaiveDate) {
        self.set_tiers(vec![
            SubscriptionTier { id: 1, name: "bronze".into(), min_spending: 0.0, discount_bonus: 0.0 },
            SubscriptionTier { id: 2, name: "silver".into(), min_spending: 1_000.0, discount_bonus: 3.0 },
            SubscriptionTier { id: 3, name: "gold".into(), min_spending: 3_000.0, discount_bonus: 5.0 },
            SubscriptionTier { id: 4, name: "platinum".into(), min_spending: 5_000.0, discount_bonus: 8.0 },
        ]);
        self.set_discount_settings(DiscountSettings::default());

        let catalog = [
            (1, "Fresh Milk 1L", 45.0, Some(120)),
            (2, "Whole Wheat Bread", 55.0, Some(40)),
            (3, "Drinking Water 6-pack", 60.0, None),
            (4, "Free-range Eggs x10", 89.0, Some(3)),
            (5, "Instant Coffee 200g", 159.0, Some(25)),
        ];
        for (id, name, price, stock) in catalog {
            self.insert_product(Product {
                id,
                name: name.into(),
                price,
                is_active: true,
                stock,
                is_flash_sale: false,
                flash_sale_order: None,
            });
        }

        let customer = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);
        let address = Address {
            id: Uuid::from_u128(0xa1),
            user_id: customer,
            label: "Home".into(),
            address_line: "99/1 Sukhumvit Rd, Bangkok".into(),
        };
        let address_id = address.id;
        self.insert_address(address);

        let now = Utc::now();
        self.create_subscription(
            Subscription {
                id: Uuid::from_u128(0x51),
                user_id: customer,
                name: "Weekly breakfast".into(),
                frequency: DeliveryFrequency::Weekly,
                next_delivery_date: today,
                address_id: Some(address_id),
                payment_method: "cod".into(),
                auto_confirm: true,
                is_active: true,
                discount_enabled: true,
                discount_percent: None,
                created_at: now - Duration::days(75),
            },
            vec![(1, 2), (2, 1), (4, 1)],
        );
        self.create_subscription(
            Subscription {
                id: Uuid::from_u128(0x52),
                user_id: customer,
                name: "Monthly pantry".into(),
                frequency: DeliveryFrequency::Monthly,
                next_delivery_date: today + Duration::days(1),
                address_id: Some(address_id),
                payment_method: "promptpay".into(),
                auto_confirm: false,
                is_active: true,
                discount_enabled: true,
                discount_percent: Some(10.0),
                created_at: now - Duration::days(200),
            },
            vec![(3, 2), (5, 1)],
        );

        self.insert_flash_sale(ScheduledFlashSale {
            id: 1,
            name: "Coffee Hour".into(),
            start_time: now + Duration::minutes(30),
            end_time: now + Duration::hours(2),
            product_ids: vec![5],
            notify_before: 60,
            is_active: true,
            notification_sent: false,
        });

        self.register_push_subscription(PushSubscription {
            id: Uuid::from_u128(0xb1),
            user_id: customer,
            endpoint: "https://push.example.com/send/demo".into(),
            p256dh: "demo-p256dh".into(),
            auth: "demo-auth".into(),
        });

        info!("Seeded demo store data: 4 tiers, 5 products, 2 subscriptions, 1 flash sale");
    }
}

impl CommerceStore for MemoryStore {
    fn due_subscriptions(&self, today: NaiveDate) -> StorefrontResult<Vec<DueSubscription>> {
        Ok(self.select_active(|s| s.next_delivery_date <= today))
    }

    fn subscriptions_due_on(&self, date: NaiveDate) -> StorefrontResult<Vec<DueSubscription>> {
        Ok(self.select_active(|s| s.next_delivery_date == date))
    }

    fn get_subscription(&self, id: Uuid) -> StorefrontResult<Option<DueSubscription>> {
        Ok(self.subscription(id).map(|s| self.join(s)))
    }

    fn update_next_delivery_date(
        &self,
        subscription_id: Uuid,
        next: NaiveDate,
        _now: DateTime<Utc>,
    ) -> StorefrontResult<()> {
        let mut entry = self
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| StorefrontError::not_found(format!("subscription {subscription_id}")))?;
        entry.next_delivery_date = next;
        Ok(())
    }

    fn subscription_orders_for(
        &self,
        subscription_id: Uuid,
        scheduled_date: NaiveDate,
    ) -> StorefrontResult<Vec<SubscriptionOrder>> {
        Ok(self
            .subscription_orders
            .lock()
            .iter()
            .filter(|r| r.subscription_id == subscription_id && r.scheduled_date == scheduled_date)
            .cloned()
            .collect())
    }

    fn insert_subscription_order(&self, record: SubscriptionOrder) -> StorefrontResult<()> {
        self.subscription_orders.lock().push(record);
        Ok(())
    }

    fn subscription_spending(&self, user_id: Uuid) -> StorefrontResult<f64> {
        let records = self.subscription_orders.lock();
        let total: f64 = records
            .iter()
            .filter(|r| r.status == SubscriptionOrderStatus::Created)
            .filter(|r| {
                self.subscriptions
                    .get(&r.subscription_id)
                    .map_or(false, |s| s.user_id == user_id)
            })
            .filter_map(|r| r.order_id)
            .filter_map(|order_id| self.orders.get(&order_id).map(|o| o.total))
            .sum();
        Ok(total)
    }

    fn subscription_tiers(&self) -> StorefrontResult<Vec<SubscriptionTier>> {
        Ok(self.tiers.read().clone())
    }

    fn discount_settings(&self) -> StorefrontResult<Option<DiscountSettings>> {
        Ok(self.settings.read().clone())
    }

    fn tier_assignment(&self, user_id: Uuid) -> StorefrontResult<Option<TierAssignment>> {
        Ok(self.tier_assignments.get(&user_id).map(|r| r.value().clone()))
    }

    fn upsert_tier_assignment(&self, assignment: TierAssignment) -> StorefrontResult<()> {
        self.tier_assignments.insert(assignment.user_id, assignment);
        Ok(())
    }

    fn insert_order(&self, order: NewOrder, now: DateTime<Utc>) -> StorefrontResult<Order> {
        let order = Order::from_new(Uuid::new_v4(), order, now);
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn insert_order_items(&self, items: Vec<OrderItem>) -> StorefrontResult<()> {
        for item in &items {
            if !self.orders.contains_key(&item.order_id) {
                return Err(StorefrontError::store(format!(
                    "order_items.order_id references missing order {}",
                    item.order_id
                )));
            }
        }
        for item in items {
            self.order_items.entry(item.order_id).or_default().push(item);
        }
        Ok(())
    }

    fn cancel_order(&self, order_id: Uuid, now: DateTime<Utc>) -> StorefrontResult<()> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StorefrontError::not_found(format!("order {order_id}")))?;
        order.status = OrderStatus::Cancelled;
        debug!(order_id = %order_id, at = %now, "Order cancelled");
        Ok(())
    }

    fn insert_notification(&self, notification: Notification) -> StorefrontResult<()> {
        self.notifications.lock().push(notification);
        Ok(())
    }

    fn active_flash_sales(&self) -> StorefrontResult<Vec<ScheduledFlashSale>> {
        let mut sales: Vec<ScheduledFlashSale> = self
            .flash_sales
            .iter()
            .filter(|r| r.value().is_active)
            .map(|r| r.value().clone())
            .collect();
        sales.sort_by_key(|s| (s.start_time, s.id));
        Ok(sales)
    }

    fn products(&self, ids: &[ProductId]) -> StorefrontResult<Vec<Product>> {
        Ok(ids.iter().filter_map(|id| self.product(*id)).collect())
    }

    fn set_flash_sale_flags(
        &self,
        product_ids: &[ProductId],
        on_sale: bool,
        _now: DateTime<Utc>,
    ) -> StorefrontResult<()> {
        for id in product_ids {
            if let Some(mut product) = self.products.get_mut(id) {
                product.is_flash_sale = on_sale;
                product.flash_sale_order = if on_sale { Some(1) } else { None };
            }
        }
        Ok(())
    }

    fn deactivate_flash_sale(&self, id: i64) -> StorefrontResult<()> {
        let mut sale = self
            .flash_sales
            .get_mut(&id)
            .ok_or_else(|| StorefrontError::not_found(format!("flash sale {id}")))?;
        sale.is_active = false;
        Ok(())
    }

    fn mark_flash_sale_notified(&self, id: i64) -> StorefrontResult<()> {
        let mut sale = self
            .flash_sales
            .get_mut(&id)
            .ok_or_else(|| StorefrontError::not_found(format!("flash sale {id}")))?;
        sale.notification_sent = true;
        Ok(())
    }

    fn push_subscriptions(&self) -> StorefrontResult<Vec<PushSubscription>> {
        Ok(self.push_subscriptions.iter().map(|r| r.value().clone()).collect())
    }

    fn push_subscriptions_for(&self, user_id: Uuid) -> StorefrontResult<Vec<PushSubscription>> {
        Ok(self
            .push_subscriptions
            .iter()
            .filter(|r| r.value().user_id == user_id)
            .map(|r| r.value().clone())
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn test_due_subscriptions_joins_items_and_address() {
        let store = MemoryStore::with_demo_data(today());
        let due = store.due_subscriptions(today()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].subscription.name, "Weekly breakfast");
        assert_eq!(due[0].lines.len(), 3);
        assert!(due[0].lines.iter().all(|l| l.product.is_some()));
        assert!(due[0].address.is_some());

        let tomorrow = store.subscriptions_due_on(today() + Duration::days(1)).unwrap();
        assert_eq!(tomorrow.len(), 1);
        assert_eq!(tomorrow[0].subscription.name, "Monthly pantry");
    }

    #[test]
    fn test_inactive_subscriptions_not_due() {
        let store = MemoryStore::with_demo_data(today());
        store.set_subscription_active(Uuid::from_u128(0x51), false);
        assert!(store.due_subscriptions(today()).unwrap().is_empty());
    }

    #[test]
    fn test_items_unique_per_product() {
        let store = MemoryStore::with_demo_data(today());
        let mut sub = store.subscription(Uuid::from_u128(0x51)).unwrap();
        sub.id = Uuid::new_v4();
        store.create_subscription(sub.clone(), vec![(1, 2), (1, 5)]);
        let joined = store.get_subscription(sub.id).unwrap().unwrap();
        assert_eq!(joined.lines.len(), 1);
        assert_eq!(joined.lines[0].item.quantity, 5);
    }

    #[test]
    fn test_order_items_require_existing_order() {
        let store = MemoryStore::new();
        let err = store
            .insert_order_items(vec![OrderItem {
                order_id: Uuid::new_v4(),
                product_id: 1,
                product_name: "Milk".into(),
                product_price: 45.0,
                quantity: 1,
                subtotal: 45.0,
            }])
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Store(_)));
    }

    #[test]
    fn test_spending_counts_only_created_records() {
        let store = MemoryStore::with_demo_data(today());
        let sub_id = Uuid::from_u128(0x51);
        let user = store.subscription(sub_id).unwrap().user_id;
        let order = store
            .insert_order(
                NewOrder {
                    user_id: user,
                    address_id: Uuid::from_u128(0xa1),
                    subtotal: 500.0,
                    delivery_fee: 0.0,
                    discount: 0.0,
                    total: 500.0,
                    payment_method: "cod".into(),
                    notes: String::new(),
                    status: OrderStatus::Pending,
                },
                Utc::now(),
            )
            .unwrap();
        let mut created = SubscriptionOrder::failed(sub_id, today(), "", Utc::now());
        created.status = SubscriptionOrderStatus::Created;
        created.order_id = Some(order.id);
        store.insert_subscription_order(created).unwrap();
        store
            .insert_subscription_order(SubscriptionOrder::failed(sub_id, today(), "x", Utc::now()))
            .unwrap();

        assert!((store.subscription_spending(user).unwrap() - 500.0).abs() < 1e-9);
        assert_eq!(store.subscription_spending(Uuid::new_v4()).unwrap(), 0.0);
    }

    #[test]
    fn test_cancel_order() {
        let store = MemoryStore::new();
        let order = store
            .insert_order(
                NewOrder {
                    user_id: Uuid::new_v4(),
                    address_id: Uuid::new_v4(),
                    subtotal: 10.0,
                    delivery_fee: 30.0,
                    discount: 0.0,
                    total: 40.0,
                    payment_method: "cod".into(),
                    notes: String::new(),
                    status: OrderStatus::Confirmed,
                },
                Utc::now(),
            )
            .unwrap();
        store.cancel_order(order.id, Utc::now()).unwrap();
        assert_eq!(store.orders_for_user(order.user_id)[0].status, OrderStatus::Cancelled);
        assert!(matches!(
            store.cancel_order(Uuid::new_v4(), Utc::now()),
            Err(StorefrontError::NotFound(_))
        ));
    }

    #[test]
    fn test_flash_sale_flags_and_lifecycle() {
        let store = MemoryStore::with_demo_data(today());
        store.set_flash_sale_flags(&[5, 999], true, Utc::now()).unwrap();
        let p = store.product(5).unwrap();
        assert!(p.is_flash_sale);
        assert_eq!(p.flash_sale_order, Some(1));

        store.set_flash_sale_flags(&[5], false, Utc::now()).unwrap();
        assert_eq!(store.product(5).unwrap().flash_sale_order, None);

        store.mark_flash_sale_notified(1).unwrap();
        store.deactivate_flash_sale(1).unwrap();
        assert!(store.active_flash_sales().unwrap().is_empty());
        assert!(store.flash_sale(1).unwrap().notification_sent);
        assert!(store.deactivate_flash_sale(42).is_err());
    }
}
