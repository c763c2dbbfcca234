//! Shared sales and the notifications they produce.
//!
//! A user may offer a copy of one of their sales to a colleague.  The
//! offer stays pending until the recipient accepts (a copy of the sale is
//! added to their records) or rejects it.  Each step leaves a
//! notification for the other party, which clients pick up by polling
//! [`Sharing::unread_notifications`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::identity::IdentityProvider;
use crate::models::{
    Notification, NotificationKind, SaleRecord, ShareRequest, ShareStatus, User,
};
use crate::store::RecordStore;

/// Read notifications older than this are dropped on the next write.
const READ_NOTIFICATION_RETENTION_DAYS: i64 = 30;

#[derive(Default)]
struct ShareBook {
    shares: HashMap<Uuid, ShareRequest>,
    notifications: HashMap<Uuid, Notification>,
}

impl ShareBook {
    fn notify(&mut self, user_id: Uuid, kind: NotificationKind, share_id: Uuid, message: String) {
        let now = Utc::now();
        self.prune_read(now - Duration::days(READ_NOTIFICATION_RETENTION_DAYS));
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind,
            share_id,
            message,
            read: false,
            created_at: now,
        };
        self.notifications.insert(notification.id, notification);
    }

    fn prune_read(&mut self, cutoff: DateTime<Utc>) {
        let before = self.notifications.len();
        self.notifications
            .retain(|_, n| !n.read || n.created_at >= cutoff);
        let pruned = before - self.notifications.len();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned read notifications");
        }
    }
}

pub struct Sharing {
    records: Arc<dyn RecordStore>,
    identity: Arc<dyn IdentityProvider>,
    book: RwLock<ShareBook>,
}

impl Sharing {
    pub fn new(records: Arc<dyn RecordStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            records,
            identity,
            book: RwLock::new(ShareBook::default()),
        }
    }

    /// Offers `sale_id` (owned by `from`) to the user registered under
    /// `recipient_email`.
    pub async fn create_share(
        &self,
        from: &User,
        sale_id: Uuid,
        recipient_email: &str,
    ) -> AppResult<ShareRequest> {
        let sale = self
            .records
            .get_sale(sale_id)
            .await?
            .filter(|s| s.owner_id == from.id)
            .ok_or(AppError::NotFound)?;
        let recipient = self
            .identity
            .lookup_by_email(recipient_email)
            .await?
            .ok_or(AppError::NotFound)?;
        if recipient.id == from.id {
            return Err(AppError::InvalidInput(
                "a sale cannot be shared with its owner".to_string(),
            ));
        }

        let mut book = self.book.write().await;
        let duplicate = book.shares.values().any(|s| {
            s.sale_id == sale_id && s.to_user == recipient.id && s.status == ShareStatus::Pending
        });
        if duplicate {
            return Err(AppError::Conflict(
                "this sale already has a pending share for that user".to_string(),
            ));
        }

        let share = ShareRequest {
            id: Uuid::new_v4(),
            sale_id,
            from_user: from.id,
            to_user: recipient.id,
            status: ShareStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        };
        book.shares.insert(share.id, share.clone());
        book.notify(
            recipient.id,
            NotificationKind::ShareReceived,
            share.id,
            format!(
                "{} shared a sale with you: {} ({})",
                from.display_name, sale.customer_name, sale.vehicle
            ),
        );
        tracing::info!(share_id = %share.id, %sale_id, to = %recipient.id, "created share");
        Ok(share)
    }

    /// Accepts or rejects a pending share addressed to `user`.
    pub async fn respond(&self, user: &User, share_id: Uuid, accept: bool) -> AppResult<ShareRequest> {
        let mut book = self.book.write().await;
        let share = book
            .shares
            .get(&share_id)
            .filter(|s| s.to_user == user.id)
            .cloned()
            .ok_or(AppError::NotFound)?;
        if share.status != ShareStatus::Pending {
            return Err(AppError::Conflict("share has already been answered".to_string()));
        }

        if accept {
            let original = self
                .records
                .get_sale(share.sale_id)
                .await?
                .ok_or(AppError::NotFound)?;
            let copy = SaleRecord {
                id: Uuid::new_v4(),
                owner_id: user.id,
                shared_from: Some(original.id),
                created_at: Utc::now(),
                ..original
            };
            self.records.insert_sale(copy).await?;
        }

        let (status, kind, verb) = if accept {
            (ShareStatus::Accepted, NotificationKind::ShareAccepted, "accepted")
        } else {
            (ShareStatus::Rejected, NotificationKind::ShareRejected, "rejected")
        };
        let answered = ShareRequest {
            status,
            responded_at: Some(Utc::now()),
            ..share
        };
        book.shares.insert(share_id, answered.clone());
        book.notify(
            answered.from_user,
            kind,
            share_id,
            format!("{} {verb} your shared sale", user.display_name),
        );
        tracing::info!(%share_id, status = verb, "share answered");
        Ok(answered)
    }

    /// Pending shares addressed to `user`, oldest first.
    pub async fn pending_for(&self, user: &User) -> Vec<ShareRequest> {
        let book = self.book.read().await;
        let mut pending: Vec<ShareRequest> = book
            .shares
            .values()
            .filter(|s| s.to_user == user.id && s.status == ShareStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.created_at);
        pending
    }

    /// Unread notifications for `user`, newest first.
    pub async fn unread_notifications(&self, user: &User) -> Vec<Notification> {
        let book = self.book.read().await;
        let mut unread: Vec<Notification> = book
            .notifications
            .values()
            .filter(|n| n.user_id == user.id && !n.read)
            .cloned()
            .collect();
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unread
    }

    pub async fn mark_read(&self, user: &User, notification_id: Uuid) -> AppResult<()> {
        let mut book = self.book.write().await;
        let notification = book
            .notifications
            .get_mut(&notification_id)
            .filter(|n| n.user_id == user.id)
            .ok_or(AppError::NotFound)?;
        notification.read = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryIdentity;
    use crate::models::{SaleEntry, SaleType};
    use crate::store::{MemoryStore, RecordQuery};
    use chrono::NaiveDate;

    struct Fixture {
        records: Arc<MemoryStore>,
        sharing: Sharing,
        alice: User,
        bob: User,
        sale: SaleRecord,
    }

    async fn fixture() -> Fixture {
        let records = Arc::new(MemoryStore::new());
        let identity = Arc::new(MemoryIdentity::new());
        let alice = identity
            .register("alice@lot.example", "Alice", "correct-horse-1")
            .await
            .expect("alice");
        let bob = identity
            .register("bob@lot.example", "Bob", "correct-horse-2")
            .await
            .expect("bob");
        let sale = records
            .insert_sale(SaleRecord {
                id: Uuid::new_v4(),
                owner_id: alice.id,
                sold_on: NaiveDate::from_ymd_opt(2024, 8, 3).expect("date"),
                customer_name: "R. Gomez".into(),
                vehicle: "2022 Outback".into(),
                stock_number: None,
                shared_from: None,
                created_at: Utc::now(),
                entry: SaleEntry {
                    sale_price: 27_500.0,
                    sale_type: SaleType::Used,
                    accessories_price: Some(1_400.0),
                    warranty_price: None,
                    warranty_cost: None,
                    maintenance_price: None,
                },
            })
            .await
            .expect("sale");
        let sharing = Sharing::new(records.clone(), identity);
        Fixture {
            records,
            sharing,
            alice,
            bob,
            sale,
        }
    }

    #[tokio::test]
    async fn accepting_copies_the_sale_and_notifies_sender() {
        let f = fixture().await;
        let share = f
            .sharing
            .create_share(&f.alice, f.sale.id, "BOB@lot.example")
            .await
            .expect("share");
        assert_eq!(share.status, ShareStatus::Pending);

        let inbox = f.sharing.unread_notifications(&f.bob).await;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::ShareReceived);
        assert_eq!(f.sharing.pending_for(&f.bob).await, vec![share.clone()]);

        let answered = f.sharing.respond(&f.bob, share.id, true).await.expect("accept");
        assert_eq!(answered.status, ShareStatus::Accepted);
        assert!(answered.responded_at.is_some());
        assert!(f.sharing.pending_for(&f.bob).await.is_empty());

        let bobs = f
            .records
            .query_sales(&RecordQuery::for_owner(f.bob.id))
            .await
            .expect("query");
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].shared_from, Some(f.sale.id));
        assert_eq!(bobs[0].entry, f.sale.entry);
        assert!(f.records.get_sale(f.sale.id).await.expect("get").is_some());

        let alerts = f.sharing.unread_notifications(&f.alice).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, NotificationKind::ShareAccepted);

        assert!(matches!(
            f.sharing.respond(&f.bob, share.id, false).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn rejecting_leaves_recipient_records_untouched() {
        let f = fixture().await;
        let share = f
            .sharing
            .create_share(&f.alice, f.sale.id, "bob@lot.example")
            .await
            .expect("share");
        let answered = f.sharing.respond(&f.bob, share.id, false).await.expect("reject");
        assert_eq!(answered.status, ShareStatus::Rejected);

        let bobs = f
            .records
            .query_sales(&RecordQuery::for_owner(f.bob.id))
            .await
            .expect("query");
        assert!(bobs.is_empty());
        let alerts = f.sharing.unread_notifications(&f.alice).await;
        assert_eq!(alerts[0].kind, NotificationKind::ShareRejected);
    }

    #[tokio::test]
    async fn guards_against_bad_shares() {
        let f = fixture().await;
        assert!(matches!(
            f.sharing.create_share(&f.alice, f.sale.id, "alice@lot.example").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            f.sharing.create_share(&f.bob, f.sale.id, "alice@lot.example").await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            f.sharing.create_share(&f.alice, f.sale.id, "carol@lot.example").await,
            Err(AppError::NotFound)
        ));

        let share = f
            .sharing
            .create_share(&f.alice, f.sale.id, "bob@lot.example")
            .await
            .expect("share");
        assert!(matches!(
            f.sharing.create_share(&f.alice, f.sale.id, "bob@lot.example").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            f.sharing.respond(&f.alice, share.id, true).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn mark_read_hides_notification() {
        let f = fixture().await;
        f.sharing
            .create_share(&f.alice, f.sale.id, "bob@lot.example")
            .await
            .expect("share");
        let inbox = f.sharing.unread_notifications(&f.bob).await;
        let id = inbox[0].id;

        assert!(matches!(
            f.sharing.mark_read(&f.alice, id).await,
            Err(AppError::NotFound)
        ));
        f.sharing.mark_read(&f.bob, id).await.expect("mark read");
        f.sharing.mark_read(&f.bob, id).await.expect("idempotent");
        assert!(f.sharing.unread_notifications(&f.bob).await.is_empty());
    }

    #[tokio::test]
    async fn old_read_notifications_are_pruned_on_next_notify() {
        let f = fixture().await;
        let stale = Utc::now() - Duration::days(READ_NOTIFICATION_RETENTION_DAYS + 1);
        let old = |read: bool| Notification {
            id: Uuid::new_v4(),
            user_id: f.bob.id,
            kind: NotificationKind::ShareReceived,
            share_id: Uuid::new_v4(),
            message: "from last quarter".into(),
            read,
            created_at: stale,
        };
        let (old_read, old_unread) = (old(true), old(false));
        {
            let mut book = f.sharing.book.write().await;
            book.notifications.insert(old_read.id, old_read.clone());
            book.notifications.insert(old_unread.id, old_unread.clone());
        }

        f.sharing
            .create_share(&f.alice, f.sale.id, "bob@lot.example")
            .await
            .expect("share");

        let book = f.sharing.book.read().await;
        assert!(!book.notifications.contains_key(&old_read.id));
        assert!(book.notifications.contains_key(&old_unread.id));
        assert_eq!(book.notifications.len(), 2);
    }
}
