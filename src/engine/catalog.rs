use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn validate_name(name: &Option<String>) -> Result<(), EngineError> {
    if let Some(n) = name
        && n.len() > MAX_NAME_LEN
    {
        return Err(EngineError::LimitExceeded("campground name too long"));
    }
    Ok(())
}

fn validate_capacity(max_reservations: u32) -> Result<(), EngineError> {
    if max_reservations == 0 {
        return Err(EngineError::Validation("max_reservations must be at least 1"));
    }
    if max_reservations > MAX_CAPACITY {
        return Err(EngineError::LimitExceeded("max_reservations too large"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_campground(
        &self,
        id: Ulid,
        name: Option<String>,
        max_reservations: u32,
    ) -> Result<(), EngineError> {
        validate_name(&name)?;
        validate_capacity(max_reservations)?;

        let _catalog = self.catalog_lock().await;
        let _gate = self.hold_commit_gate().await;
        if self.store.campground_count() >= MAX_CAMPGROUNDS {
            return Err(EngineError::LimitExceeded("too many campgrounds"));
        }
        if self.store.contains_campground(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::CampgroundCreated {
            id,
            name,
            max_reservations,
        };
        self.journal.append(&event).await?;
        self.store.apply_catalog(&event);
        tracing::debug!("created campground {id} (capacity {max_reservations})");
        Ok(())
    }

    /// Change name, capacity or rating. Fields left `None` keep their value;
    /// `Some(None)` clears the rating.
    ///
    /// Capacity may not drop below the units already held at the busiest
    /// instant; existing reservations are never revoked.
    pub async fn update_campground(
        &self,
        id: Ulid,
        name: Option<String>,
        max_reservations: Option<u32>,
        rating: Option<Option<f64>>,
    ) -> Result<CampgroundInfo, EngineError> {
        validate_name(&name)?;
        if let Some(cap) = max_reservations {
            validate_capacity(cap)?;
        }
        if let Some(Some(r)) = rating
            && (!r.is_finite() || r < 0.0)
        {
            return Err(EngineError::Validation("rating must be a non-negative number"));
        }

        let mut cs = self.lock_campground(id).await?;
        let new_cap = max_reservations.unwrap_or(cs.max_reservations);
        let peak = cs.index.peak_overall();
        if new_cap < peak {
            return Err(EngineError::Conflict(format!(
                "campground {id} already holds {peak} units at its busiest; cannot lower capacity to {new_cap}"
            )));
        }

        let event = Event::CampgroundUpdated {
            id,
            name: name.or_else(|| cs.name.clone()),
            max_reservations: new_cap,
            rating: rating.unwrap_or(cs.rating),
        };
        self.persist_and_apply(&mut cs, &event).await?;
        Ok(cs.info())
    }

    /// Remove a campground. Refused while any reservation still holds units;
    /// archived records go with it.
    pub async fn delete_campground(&self, id: Ulid) -> Result<(), EngineError> {
        let _catalog = self.catalog_lock().await;
        let cs = self.lock_campground(id).await?;
        let active = cs.active_reservations().count();
        if active > 0 {
            return Err(EngineError::Conflict(format!(
                "campground {id} has {active} active reservations"
            )));
        }

        let event = Event::CampgroundDeleted { id };
        self.journal.append(&event).await?;
        self.store.remove_campground(&cs);
        tracing::debug!("deleted campground {id}");
        Ok(())
    }

    pub async fn create_tag(&self, id: Ulid, name: &str) -> Result<Tag, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("tag name must not be empty"));
        }
        if name.len() > MAX_TAG_NAME_LEN {
            return Err(EngineError::LimitExceeded("tag name too long"));
        }

        let _catalog = self.catalog_lock().await;
        let _gate = self.hold_commit_gate().await;
        if self.store.tag_count() >= MAX_TAGS {
            return Err(EngineError::LimitExceeded("too many tags"));
        }
        if self.store.get_tag(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        if let Some(existing) = self.store.tag_by_name(name) {
            return Err(EngineError::Conflict(format!(
                "tag name {name:?} is taken by {existing}"
            )));
        }

        let event = Event::TagCreated {
            id,
            name: name.to_string(),
        };
        self.journal.append(&event).await?;
        self.store.apply_catalog(&event);
        Ok(Tag {
            id,
            name: name.to_string(),
        })
    }

    /// Delete a tag and detach it from every campground carrying it.
    pub async fn delete_tag(&self, id: Ulid) -> Result<(), EngineError> {
        let _catalog = self.catalog_lock().await;
        if self.store.get_tag(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        let _gate = self.hold_commit_gate().await;

        let event = Event::TagDeleted { id };
        self.journal.append(&event).await?;
        let affected = self.store.remove_tag(&id);
        // The gate is already held shared; lock the campgrounds directly.
        for cid in &affected {
            if let Some(cs) = self.store.get_campground(cid) {
                cs.write().await.tags.remove(&id);
            }
        }
        tracing::debug!("deleted tag {id}, detached from {} campgrounds", affected.len());
        Ok(())
    }

    pub async fn attach_tag(&self, campground_id: Ulid, tag_id: Ulid) -> Result<(), EngineError> {
        let _catalog = self.catalog_lock().await;
        if self.store.get_tag(&tag_id).is_none() {
            return Err(EngineError::NotFound(tag_id));
        }
        let mut cs = self.lock_campground(campground_id).await?;
        if cs.tags.contains(&tag_id) {
            return Err(EngineError::Conflict(format!(
                "tag {tag_id} already attached to {campground_id}"
            )));
        }
        if cs.tags.len() >= MAX_TAGS_PER_CAMPGROUND {
            return Err(EngineError::LimitExceeded("too many tags on campground"));
        }

        let event = Event::TagAttached {
            campground_id,
            tag_id,
        };
        self.persist_and_apply(&mut cs, &event).await
    }

    pub async fn detach_tag(&self, campground_id: Ulid, tag_id: Ulid) -> Result<(), EngineError> {
        let _catalog = self.catalog_lock().await;
        let mut cs = self.lock_campground(campground_id).await?;
        if !cs.tags.contains(&tag_id) {
            return Err(EngineError::NotFound(tag_id));
        }

        let event = Event::TagDetached {
            campground_id,
            tag_id,
        };
        self.persist_and_apply(&mut cs, &event).await
    }
}
