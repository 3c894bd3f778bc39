//! Loadout catalog - static weapon and equipment tables per team

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ws::protocol::{LoadoutSelection, Team};

/// Weapon stats shared by every instance of a catalog weapon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponStats {
    pub name: &'static str,
    /// Damage per pellet
    pub damage: f32,
    /// Cooldown between shots (milliseconds)
    pub fire_rate_ms: u64,
    pub mag_size: u32,
    /// Reserve pool at round start, `None` for melee weapons that never run dry
    pub total_ammo: Option<u32>,
    /// Cone width in radians
    pub spread: f32,
    pub pellets: u32,
    pub auto: bool,
    pub noise_level: u32,
    pub description: &'static str,
}

/// Equipment effect family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentEffect {
    Stun,
    Smoke,
    Shield,
    Heal,
    Restrain,
    Breach,
    Recon,
    Drone,
    Negotiate,
    Fire,
    Explosive,
    Unlock,
    Thrown,
    Trap,
    Disguise,
    Hostage,
    Jam,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquipmentStats {
    pub name: &'static str,
    pub quantity: u32,
    pub effect: EquipmentEffect,
    pub description: &'static str,
}

/// Loadout slot category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Primary,
    Secondary,
    Equipment,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Primary, Category::Secondary, Category::Equipment];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Primary => "primary",
            Category::Secondary => "secondary",
            Category::Equipment => "equipment",
        })
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Category::Primary),
            "secondary" => Ok(Category::Secondary),
            "equipment" => Ok(Category::Equipment),
            other => Err(other.to_string()),
        }
    }
}

/// Result of a catalog lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CatalogItem {
    Weapon(&'static WeaponStats),
    Equipment(&'static EquipmentStats),
}

/// Item listing sent to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Loadout validation errors, each naming the offending slot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadoutError {
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid primary weapon: {0}")]
    InvalidPrimary(String),

    #[error("Invalid secondary weapon: {0}")]
    InvalidSecondary(String),

    #[error("Invalid equipment: {0}")]
    InvalidEquipment(String),
}

const fn weapon(
    name: &'static str,
    damage: f32,
    fire_rate_ms: u64,
    mag_size: u32,
    total_ammo: Option<u32>,
    spread: f32,
    pellets: u32,
    auto: bool,
    noise_level: u32,
    description: &'static str,
) -> WeaponStats {
    WeaponStats {
        name,
        damage,
        fire_rate_ms,
        mag_size,
        total_ammo,
        spread,
        pellets,
        auto,
        noise_level,
        description,
    }
}

const fn equipment(
    name: &'static str,
    quantity: u32,
    effect: EquipmentEffect,
    description: &'static str,
) -> EquipmentStats {
    EquipmentStats {
        name,
        quantity,
        effect,
        description,
    }
}

static COP_PRIMARY: &[(&str, WeaponStats)] = &[
    ("mp5", weapon("MP5", 20.0, 100, 30, Some(90), 0.1, 1, true, 200, "Reliable submachine gun, balanced performance")),
    ("m4a1", weapon("M4A1", 30.0, 120, 30, Some(90), 0.08, 1, true, 250, "Standard issue rifle, high accuracy")),
    ("taser_rifle", weapon("Taser Rifle", 10.0, 1500, 1, Some(10), 0.05, 1, false, 50, "Non-lethal, stuns and forces surrender")),
    ("beanbag_shotgun", weapon("Beanbag Shotgun", 15.0, 800, 6, Some(18), 0.3, 3, false, 150, "Non-lethal, knocks back and stuns")),
    ("suppressed_mp5", weapon("MP5-SD", 18.0, 110, 30, Some(90), 0.1, 1, true, 60, "Suppressed SMG for stealth operations")),
];

static COP_SECONDARY: &[(&str, WeaponStats)] = &[
    ("m1911", weapon("M1911", 35.0, 300, 7, Some(21), 0.12, 1, false, 180, "High damage pistol, reliable sidearm")),
    ("glock", weapon("Glock 17", 25.0, 200, 17, Some(51), 0.1, 1, false, 170, "High capacity pistol, fast fire rate")),
    ("taser_pistol", weapon("Taser Pistol", 5.0, 2000, 2, Some(6), 0.08, 1, false, 30, "Non-lethal sidearm, forces surrender")),
    ("suppressed_pistol", weapon("Suppressed P226", 28.0, 250, 15, Some(45), 0.1, 1, false, 40, "Silent sidearm for stealth")),
];

static COP_EQUIPMENT: &[(&str, EquipmentStats)] = &[
    ("flashbang", equipment("Flashbang", 2, EquipmentEffect::Stun, "Blinds and stuns all in radius")),
    ("smoke", equipment("Smoke Grenade", 2, EquipmentEffect::Smoke, "Creates concealment, blocks vision")),
    ("shield", equipment("Riot Shield", 1, EquipmentEffect::Shield, "Blocks frontal attacks, slows movement")),
    ("medkit", equipment("Medkit", 1, EquipmentEffect::Heal, "Restores 50 HP to self or teammate")),
    ("handcuffs", equipment("Handcuffs", 3, EquipmentEffect::Restrain, "Arrests stunned/surrendered criminals")),
    ("breach_charge", equipment("Breach Charge", 2, EquipmentEffect::Breach, "Explosive door breach, stuns enemies")),
    ("fiber_camera", equipment("Fiber Optic Camera", 1, EquipmentEffect::Recon, "See through doors and walls")),
    ("drone", equipment("Recon Drone", 1, EquipmentEffect::Drone, "Remote camera drone for scouting")),
    ("negotiator_phone", equipment("Negotiator Phone", 1, EquipmentEffect::Negotiate, "Improved hostage negotiation success")),
];

static CRIMINAL_PRIMARY: &[(&str, WeaponStats)] = &[
    ("uzi", weapon("Uzi", 18.0, 80, 32, Some(96), 0.15, 1, true, 180, "High rate of fire SMG, less accurate")),
    ("sawed_off", weapon("Sawed-Off Shotgun", 25.0, 600, 2, Some(20), 0.6, 8, false, 350, "Devastating close range, intimidating")),
    ("ak47", weapon("AK-47", 35.0, 150, 30, Some(90), 0.12, 1, true, 300, "High damage assault rifle, more recoil")),
    ("mac10", weapon("MAC-10", 15.0, 60, 30, Some(120), 0.2, 1, true, 200, "Extremely fast fire rate, low accuracy")),
    ("suppressed_smg", weapon("Suppressed MP7", 16.0, 90, 40, Some(120), 0.12, 1, true, 50, "Silent SMG for stealth approaches")),
];

static CRIMINAL_SECONDARY: &[(&str, WeaponStats)] = &[
    ("desert_eagle", weapon("Desert Eagle", 50.0, 500, 7, Some(21), 0.15, 1, false, 250, "Heavy pistol, intimidating presence")),
    ("knife", weapon("Combat Knife", 60.0, 400, 1, None, 0.0, 1, false, 20, "Silent kills, instant kill from behind")),
    ("revolver", weapon("Revolver", 45.0, 600, 6, Some(24), 0.1, 1, false, 220, "Powerful, accurate handgun")),
    ("suppressed_pistol", weapon("Suppressed Glock", 22.0, 200, 17, Some(51), 0.1, 1, false, 35, "Silent pistol for stealth")),
];

static CRIMINAL_EQUIPMENT: &[(&str, EquipmentStats)] = &[
    ("molotov", equipment("Molotov Cocktail", 2, EquipmentEffect::Fire, "Area denial, damages over time")),
    ("pipe_bomb", equipment("Pipe Bomb", 2, EquipmentEffect::Explosive, "High damage explosive")),
    ("lockpick", equipment("Lockpick Set", 5, EquipmentEffect::Unlock, "Opens locked doors silently")),
    ("throwing_knife", equipment("Throwing Knives", 4, EquipmentEffect::Thrown, "Silent ranged attack, retrievable")),
    ("smoke_bomb", equipment("Smoke Bomb", 2, EquipmentEffect::Smoke, "Quick deploy smoke for escape")),
    ("trip_wire", equipment("Trip Wire Trap", 3, EquipmentEffect::Trap, "Explosive trap for ambushes")),
    ("disguise_kit", equipment("Disguise Kit", 1, EquipmentEffect::Disguise, "Appear as civilian briefly")),
    ("hostage_restraints", equipment("Zip Ties", 3, EquipmentEffect::Hostage, "Take civilians hostage")),
    ("jammer", equipment("Signal Jammer", 1, EquipmentEffect::Jam, "Disables cop electronics")),
];

fn weapon_table(team: Team, category: Category) -> &'static [(&'static str, WeaponStats)] {
    match (team, category) {
        (Team::Cops, Category::Primary) => COP_PRIMARY,
        (Team::Cops, Category::Secondary) => COP_SECONDARY,
        (Team::Criminals, Category::Primary) => CRIMINAL_PRIMARY,
        (Team::Criminals, Category::Secondary) => CRIMINAL_SECONDARY,
        (_, Category::Equipment) => &[],
    }
}

fn equipment_table(team: Team) -> &'static [(&'static str, EquipmentStats)] {
    match team {
        Team::Cops => COP_EQUIPMENT,
        Team::Criminals => CRIMINAL_EQUIPMENT,
    }
}

/// Look up a weapon for a team's primary or secondary slot
pub fn weapon_stats(team: Team, category: Category, id: &str) -> Option<&'static WeaponStats> {
    weapon_table(team, category)
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, stats)| stats)
}

pub fn equipment_stats(team: Team, id: &str) -> Option<&'static EquipmentStats> {
    equipment_table(team)
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, stats)| stats)
}

/// Generic lookup across all categories
pub fn item(team: Team, category: Category, id: &str) -> Option<CatalogItem> {
    match category {
        Category::Equipment => equipment_stats(team, id).map(CatalogItem::Equipment),
        _ => weapon_stats(team, category, id).map(CatalogItem::Weapon),
    }
}

/// Check every slot of a loadout against the team's pools
pub fn validate_loadout(team: Team, loadout: &LoadoutSelection) -> Result<(), LoadoutError> {
    ResolvedLoadout::resolve(team, loadout).map(|_| ())
}

/// String-keyed variant used by the admin API
pub fn validate_loadout_for_role(role: &str, loadout: &LoadoutSelection) -> Result<(), LoadoutError> {
    let team = parse_role(role)?;
    validate_loadout(team, loadout)
}

pub fn parse_role(role: &str) -> Result<Team, LoadoutError> {
    role.parse::<Team>().map_err(LoadoutError::InvalidRole)
}

/// Items a team may pick for one slot
pub fn available(team: Team, category: Category) -> Vec<CatalogEntry> {
    match category {
        Category::Equipment => equipment_table(team)
            .iter()
            .map(|(id, stats)| CatalogEntry {
                id: id.to_string(),
                name: stats.name.to_string(),
                description: stats.description.to_string(),
            })
            .collect(),
        _ => weapon_table(team, category)
            .iter()
            .map(|(id, stats)| CatalogEntry {
                id: id.to_string(),
                name: stats.name.to_string(),
                description: stats.description.to_string(),
            })
            .collect(),
    }
}

pub fn default_loadout(team: Team) -> LoadoutSelection {
    ResolvedLoadout::default_for(team).selection()
}

/// A validated loadout with its stat blocks attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLoadout {
    pub primary: (&'static str, &'static WeaponStats),
    pub secondary: (&'static str, &'static WeaponStats),
    pub equipment: (&'static str, &'static EquipmentStats),
}

impl ResolvedLoadout {
    /// Validate and resolve in one pass
    pub fn resolve(team: Team, loadout: &LoadoutSelection) -> Result<Self, LoadoutError> {
        let primary = lookup(weapon_table(team, Category::Primary), &loadout.primary)
            .ok_or_else(|| LoadoutError::InvalidPrimary(loadout.primary.clone()))?;
        let secondary = lookup(weapon_table(team, Category::Secondary), &loadout.secondary)
            .ok_or_else(|| LoadoutError::InvalidSecondary(loadout.secondary.clone()))?;
        let equipment = lookup(equipment_table(team), &loadout.equipment)
            .ok_or_else(|| LoadoutError::InvalidEquipment(loadout.equipment.clone()))?;

        Ok(Self {
            primary,
            secondary,
            equipment,
        })
    }

    /// Cops: mp5 / m1911 / flashbang. Criminals: ak47 / desert_eagle / pipe_bomb.
    pub fn default_for(team: Team) -> Self {
        let (primary, secondary, equipment) = match team {
            Team::Cops => (&COP_PRIMARY[0], &COP_SECONDARY[0], &COP_EQUIPMENT[0]),
            Team::Criminals => (
                &CRIMINAL_PRIMARY[2],
                &CRIMINAL_SECONDARY[0],
                &CRIMINAL_EQUIPMENT[1],
            ),
        };
        Self {
            primary: (primary.0, &primary.1),
            secondary: (secondary.0, &secondary.1),
            equipment: (equipment.0, &equipment.1),
        }
    }

    pub fn selection(&self) -> LoadoutSelection {
        LoadoutSelection {
            primary: self.primary.0.to_string(),
            secondary: self.secondary.0.to_string(),
            equipment: self.equipment.0.to_string(),
        }
    }
}

fn lookup<T>(table: &'static [(&'static str, T)], id: &str) -> Option<(&'static str, &'static T)> {
    table
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(key, stats)| (*key, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(primary: &str, secondary: &str, equipment: &str) -> LoadoutSelection {
        LoadoutSelection {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            equipment: equipment.to_string(),
        }
    }

    #[test]
    fn defaults_are_valid_for_their_team() {
        for team in [Team::Cops, Team::Criminals] {
            assert_eq!(validate_loadout(team, &default_loadout(team)), Ok(()));
        }
        assert_eq!(default_loadout(Team::Cops), selection("mp5", "m1911", "flashbang"));
        assert_eq!(
            default_loadout(Team::Criminals),
            selection("ak47", "desert_eagle", "pipe_bomb")
        );
    }

    #[test]
    fn resolve_attaches_stats() {
        let resolved =
            ResolvedLoadout::resolve(Team::Criminals, &selection("sawed_off", "knife", "jammer"))
                .unwrap();
        assert_eq!(resolved.primary.1.pellets, 8);
        assert_eq!(resolved.secondary.1.total_ammo, None);
        assert_eq!(resolved.equipment.0, "jammer");
        assert_eq!(
            ResolvedLoadout::resolve(Team::Cops, &selection("mp5", "m1911", "jammer")),
            Err(LoadoutError::InvalidEquipment("jammer".to_string()))
        );
    }

    #[test]
    fn validation_names_the_first_bad_slot() {
        assert_eq!(
            validate_loadout(Team::Cops, &selection("ak47", "m1911", "flashbang")),
            Err(LoadoutError::InvalidPrimary("ak47".to_string()))
        );
        assert_eq!(
            validate_loadout(Team::Cops, &selection("mp5", "knife", "flashbang")),
            Err(LoadoutError::InvalidSecondary("knife".to_string()))
        );
        assert_eq!(
            validate_loadout(Team::Criminals, &selection("uzi", "knife", "")),
            Err(LoadoutError::InvalidEquipment(String::new()))
        );
    }

    #[test]
    fn validation_and_resolution_agree() {
        let cases = [
            (Team::Cops, selection("m4a1", "glock", "smoke")),
            (Team::Cops, selection("ak47", "knife", "jammer")),
            (Team::Criminals, selection("uzi", "m1911", "molotov")),
            (Team::Criminals, selection("sawed_off", "knife", "flashbang")),
        ];
        for (team, loadout) in &cases {
            assert_eq!(
                validate_loadout(*team, loadout),
                ResolvedLoadout::resolve(*team, loadout).map(|_| ())
            );
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = validate_loadout_for_role("swat", &default_loadout(Team::Cops)).unwrap_err();
        assert_eq!(err, LoadoutError::InvalidRole("swat".to_string()));
        assert_eq!(err.to_string(), "Invalid role: swat");
        assert_eq!(
            validate_loadout_for_role("criminals", &default_loadout(Team::Criminals)),
            Ok(())
        );
    }

    #[test]
    fn item_lookup_resolves_stats() {
        match item(Team::Criminals, Category::Primary, "sawed_off") {
            Some(CatalogItem::Weapon(stats)) => {
                assert_eq!(stats.pellets, 8);
                assert_eq!(stats.mag_size, 2);
            }
            other => panic!("unexpected lookup: {:?}", other),
        }
        assert!(matches!(
            item(Team::Cops, Category::Equipment, "drone"),
            Some(CatalogItem::Equipment(_))
        ));
        assert_eq!(item(Team::Cops, Category::Primary, "drone"), None);
        assert_eq!(
            weapon_stats(Team::Criminals, Category::Secondary, "knife").map(|w| w.total_ammo),
            Some(None)
        );
    }

    #[test]
    fn listings_cover_each_pool() {
        assert_eq!(available(Team::Cops, Category::Primary).len(), 5);
        assert_eq!(available(Team::Criminals, Category::Secondary).len(), 4);
        assert_eq!(available(Team::Criminals, Category::Equipment).len(), 9);
    }
}
