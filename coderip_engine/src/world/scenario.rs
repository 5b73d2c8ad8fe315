use super::kinds::ObjectKind;
use super::World;
use crate::error::WorldError;

/// Lay out the first room: the password door, a piggy bank, the letter,
/// three matches and the gyro.
pub fn populate_stage_one(world: &mut World) -> Result<(), WorldError> {
    let (width, height) = world.size();
    world.add_object(
        ObjectKind::PasswordDoor,
        Some("PasswordDoor"),
        width - 100.0,
        height / 2.0,
    )?;
    world.add_object(ObjectKind::PiggyBank, Some("PiggyBank"), 100.0, 100.0)?;
    world.add_object(ObjectKind::Letter, Some("Letter"), 200.0, height / 2.0)?;
    for index in 0..3 {
        let name = format!("Match_{}", index + 1);
        world.add_object(
            ObjectKind::Match,
            Some(&name),
            80.0 + f64::from(index) * 50.0,
            height - 100.0,
        )?;
    }
    world.add_object(ObjectKind::Gyro, Some("Gyro"), width / 2.0, height / 2.0 + 150.0)?;
    log::info!("stage one ready with {} objects", world.objects().count());
    Ok(())
}
